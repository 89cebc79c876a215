//! Best-effort detection of work already done for an issue.
//!
//! Scans the issue body and discussion for PR references, completion markers
//! and the issue's own branch name. Phrasings outside these patterns are missed.

use std::sync::LazyLock;

use regex::Regex;

use crate::github::IssueDetail;
use crate::roles::markers::DEVELOPMENT_COMPLETE;

static PR_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:PR|pull request)\s*#\d+|github\.com/[\w.-]+/[\w.-]+/pull/\d+").unwrap()
});

/// The first matching reference, for the skip reason.
pub fn find_existing_work(detail: &IssueDetail) -> Option<String> {
    let branch = Regex::new(&format!(r"\bfix-issue-{}\b", detail.issue.number)).ok();
    std::iter::once(detail.issue.body.as_str())
        .chain(detail.comments.iter().map(|c| c.body.as_str()))
        .find_map(|text| {
            if let Some(m) = PR_REFERENCE.find(text) {
                return Some(m.as_str().to_string());
            }
            if text.contains(DEVELOPMENT_COMPLETE) {
                return Some(DEVELOPMENT_COMPLETE.to_string());
            }
            branch
                .as_ref()
                .and_then(|re| re.find(text))
                .map(|m| m.as_str().to_string())
        })
}
