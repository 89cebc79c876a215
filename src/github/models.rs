use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Labels that promote an issue to high priority. Matched exactly.
pub const HIGH_PRIORITY_LABELS: &[&str] = &["critical", "urgent", "P0", "P1"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
}

impl Priority {
    pub fn from_labels(labels: &[String]) -> Self {
        if labels
            .iter()
            .any(|l| HIGH_PRIORITY_LABELS.contains(&l.as_str()))
        {
            Priority::High
        } else {
            Priority::Normal
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
        }
    }
}

/// An open issue from the backlog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub priority: Priority,
}

impl Issue {
    pub fn to_prompt(&self) -> String {
        format!(
            "## Issue #{}: {}\n**Priority:** {}\n**Labels:** {}\n**Created:** {}\n\n### Description\n{}\n",
            self.number,
            self.title,
            self.priority,
            if self.labels.is_empty() {
                "None".to_string()
            } else {
                self.labels.join(", ")
            },
            self.created_at.to_rfc3339(),
            if self.body.trim().is_empty() {
                "No description provided."
            } else {
                &self.body
            }
        )
    }
}

/// High priority first, then oldest first.
pub fn sort_backlog(issues: &mut [Issue]) {
    issues.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub body: String,
}

/// An issue plus its first few discussion comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDetail {
    pub issue: Issue,
    pub comments: Vec<Comment>,
}

impl IssueDetail {
    /// Body and comments joined, for marker scanning.
    pub fn discussion_text(&self) -> String {
        let mut text = self.issue.body.clone();
        for comment in &self.comments {
            text.push('\n');
            text.push_str(&comment.body);
        }
        text
    }

    pub fn to_prompt(&self) -> String {
        let mut out = self.issue.to_prompt();
        if !self.comments.is_empty() {
            out.push_str("\n### Discussion\n");
            for c in &self.comments {
                out.push_str(&format!(
                    "\n**{}** ({}):\n{}\n",
                    c.author,
                    c.created_at.date_naive(),
                    c.body
                ));
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrStatus {
    Draft,
    Open,
    Merged,
    Closed,
}

impl PrStatus {
    /// Merged wins over closed, closed over draft.
    pub fn from_flags(state: &str, draft: bool, merged: bool) -> Self {
        if merged {
            PrStatus::Merged
        } else if state == "closed" {
            PrStatus::Closed
        } else if draft {
            PrStatus::Draft
        } else {
            PrStatus::Open
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiStatus {
    Pending,
    Queued,
    InProgress,
    Success,
    Failure,
    Cancelled,
    Unknown,
}

impl CiStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CiStatus::Success | CiStatus::Failure | CiStatus::Cancelled)
    }
}

impl std::fmt::Display for CiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CiStatus::Pending => "pending",
            CiStatus::Queued => "queued",
            CiStatus::InProgress => "in_progress",
            CiStatus::Success => "success",
            CiStatus::Failure => "failure",
            CiStatus::Cancelled => "cancelled",
            CiStatus::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// One native CI run as reported for a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub status: String,
    pub conclusion: Option<String>,
}

/// Combined commit status from non-native CI providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedStatus {
    pub state: String,
    pub total_count: u64,
}

/// Native runs first; the combined status only when there are none; pending
/// when neither reports anything.
pub fn resolve_ci_status(runs: &[RunState], combined: Option<&CombinedStatus>) -> CiStatus {
    if !runs.is_empty() {
        let mut all_completed = true;
        let mut any_failed = false;
        let mut any_cancelled = false;
        for run in runs {
            if run.status != "completed" {
                all_completed = false;
                continue;
            }
            match run.conclusion.as_deref() {
                Some("failure") | Some("timed_out") => any_failed = true,
                Some("cancelled") => any_cancelled = true,
                _ => {}
            }
        }
        return if !all_completed {
            CiStatus::InProgress
        } else if any_failed {
            CiStatus::Failure
        } else if any_cancelled {
            CiStatus::Cancelled
        } else {
            CiStatus::Success
        };
    }

    match combined {
        Some(c) if c.total_count > 0 => match c.state.as_str() {
            "success" => CiStatus::Success,
            "pending" => CiStatus::Pending,
            "failure" | "error" => CiStatus::Failure,
            _ => CiStatus::Unknown,
        },
        _ => CiStatus::Pending,
    }
}

/// A pull request as read for one review pass. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrRecord {
    pub number: u64,
    pub url: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub head_branch: String,
    pub base_branch: String,
    pub head_sha: String,
    pub status: PrStatus,
    /// `None` while the platform is still computing it.
    pub mergeable: Option<bool>,
    pub files_changed: Vec<String>,
    pub ci_status: CiStatus,
}

impl PrRecord {
    pub fn to_prompt(&self) -> String {
        format!(
            "## PR #{}: {}\n**Status:** {:?}\n**Branch:** {} -> {}\n**Author:** {}\n**CI Status:** {}\n\n\
             ### Files Changed ({})\n{}\n\n### Description\n{}\n",
            self.number,
            self.title,
            self.status,
            self.head_branch,
            self.base_branch,
            self.author,
            self.ci_status,
            self.files_changed.len(),
            self.files_changed
                .iter()
                .map(|f| format!("- `{}`", f))
                .collect::<Vec<_>>()
                .join("\n"),
            if self.body.is_empty() {
                "No description."
            } else {
                &self.body
            }
        )
    }
}

/// Parameters for opening a pull request from an existing branch.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPr {
    pub branch: String,
    pub title: String,
    pub body: String,
    pub base: String,
    pub draft: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPr {
    pub number: u64,
    pub url: String,
    pub title: String,
    /// An open PR for the branch was already there and is returned instead.
    pub already_existed: bool,
}

/// Result of pushing files to a branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPush {
    pub branch: String,
    /// The branch reference was already present before this call.
    pub branch_existed: bool,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub commit_sha: String,
}

impl BranchPush {
    pub fn total(&self) -> usize {
        self.created.len() + self.updated.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub not_found: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    pub sha: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    /// First line of the head commit message.
    pub message: String,
    pub protected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedJob {
    /// `<workflow>/<job>`
    pub name: String,
    pub failed_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub branch: String,
    pub head_sha: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

/// Directories first, then files, each by path.
pub fn sort_entries(entries: &mut [DirEntry]) {
    entries.sort_by(|a, b| {
        let rank = |e: &DirEntry| match e.kind {
            EntryKind::Dir => 0,
            EntryKind::File => 1,
        };
        rank(a).cmp(&rank(b)).then_with(|| a.path.cmp(&b.path))
    });
}

pub fn render_tree(path: &str, entries: &[DirEntry]) -> String {
    let mut out = format!("Directory: {}\n", if path.is_empty() { "/" } else { path });
    for e in entries {
        match e.kind {
            EntryKind::Dir => out.push_str(&format!("  {}/\n", e.name)),
            EntryKind::File => out.push_str(&format!("  {}\n", e.name)),
        }
    }
    out
}

/// An environment template found in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvTemplate {
    pub file: String,
    pub content: String,
    pub variables: Vec<String>,
}
