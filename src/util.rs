//! Shared utility functions for the Nightwatch crate.

/// Marker appended to output cut at a display bound.
pub const TRUNCATION_MARKER: &str = "\n... [truncated";

/// Convert a title to a branch-safe slug: lowercase, alphanumerics joined by
/// single dashes, at most `max_len` bytes.
pub fn slugify(title: &str, max_len: usize) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.len() > max_len {
        slug[..slug.floor_char_boundary(max_len)]
            .trim_end_matches('-')
            .to_string()
    } else {
        slug
    }
}

/// Branch name owned by one issue. Disjoint issues never share a branch.
pub fn issue_branch_name(issue_number: u64, title: &str) -> String {
    let slug = slugify(title, 40);
    if slug.is_empty() {
        format!("fix-issue-{}", issue_number)
    } else {
        format!("fix-issue-{}-{}", issue_number, slug)
    }
}

/// Keep at most `max_chars` characters of `text`. When anything is dropped the
/// result ends with an explicit marker naming how many characters were cut.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}{} {} chars]", kept, TRUNCATION_MARKER, total - max_chars)
}

/// Replace every occurrence of `secret` in `text` with `***`.
pub fn redact(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, "***")
}
