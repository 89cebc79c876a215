use serde::Serialize;

use crate::errors::WorkflowError;
use crate::github::Issue;

/// Lifecycle of one issue.
///
/// ```text
/// pending → in_progress → pr_created → qa_in_progress → qa_passed ─┐
///               │                                   ╰→ qa_failed ──┼→ completed
///               ╰──────────────────────────────────────────────────┴→ failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Pending,
    InProgress,
    PrCreated,
    QaInProgress,
    QaPassed,
    QaFailed,
    Completed,
    Failed,
}

impl IssueStatus {
    pub fn can_transition_to(self, next: IssueStatus) -> bool {
        use IssueStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, PrCreated)
                | (InProgress, Failed)
                | (PrCreated, QaInProgress)
                | (PrCreated, Failed)
                | (QaInProgress, QaPassed)
                | (QaInProgress, QaFailed)
                | (QaPassed, Completed)
                | (QaFailed, Completed)
                | (QaFailed, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, IssueStatus::Completed | IssueStatus::Failed)
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IssueStatus::Pending => "pending",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::PrCreated => "pr_created",
            IssueStatus::QaInProgress => "qa_in_progress",
            IssueStatus::QaPassed => "qa_passed",
            IssueStatus::QaFailed => "qa_failed",
            IssueStatus::Completed => "completed",
            IssueStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A unit of work: one issue in one repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueTask {
    pub repo: String,
    pub issue: Issue,
    status: IssueStatus,
    pub pr_number: Option<u64>,
    pub retries: u32,
    pub max_retries: u32,
}

impl IssueTask {
    pub fn new(repo: impl Into<String>, issue: Issue, max_retries: u32) -> Self {
        Self {
            repo: repo.into(),
            issue,
            status: IssueStatus::Pending,
            pr_number: None,
            retries: 0,
            max_retries,
        }
    }

    pub fn number(&self) -> u64 {
        self.issue.number
    }

    pub fn status(&self) -> IssueStatus {
        self.status
    }

    pub fn transition(&mut self, next: IssueStatus) -> Result<(), WorkflowError> {
        if !self.status.can_transition_to(next) {
            return Err(WorkflowError::InvalidTransition {
                issue: self.issue.number,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Where a worker is in its supervision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    CheckingExistingPr,
    Developing,
    CoachingRetry,
    QaVerifying,
    Reporting,
    Done,
}

/// The closed vocabulary a worker reports with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerOutcome {
    Complete,
    Escalate,
    Skip,
    Idle,
    Failed,
    /// Not reported yet.
    Pending,
}

impl WorkerOutcome {
    /// Only these count toward a failure tally.
    pub fn is_failure(self) -> bool {
        matches!(self, WorkerOutcome::Failed | WorkerOutcome::Escalate)
    }

    pub fn label(self) -> &'static str {
        match self {
            WorkerOutcome::Complete => "COMPLETE",
            WorkerOutcome::Escalate => "ESCALATE",
            WorkerOutcome::Skip => "SKIP",
            WorkerOutcome::Idle => "IDLE",
            WorkerOutcome::Failed => "FAILED",
            WorkerOutcome::Pending => "PENDING",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "COMPLETE" => Some(WorkerOutcome::Complete),
            "ESCALATE" => Some(WorkerOutcome::Escalate),
            "SKIP" => Some(WorkerOutcome::Skip),
            "IDLE" => Some(WorkerOutcome::Idle),
            "FAILED" => Some(WorkerOutcome::Failed),
            "PENDING" => Some(WorkerOutcome::Pending),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkerOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label().to_lowercase())
    }
}

/// Terminal report of one worker over one assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerResult {
    pub worker: usize,
    pub issue: Option<u64>,
    pub outcome: WorkerOutcome,
    pub pr_number: Option<u64>,
    pub pr_url: Option<String>,
    pub qa_passed: Option<bool>,
    pub coverage_percent: Option<f64>,
    pub attempts: u32,
    /// Why the worker skipped, escalated or failed.
    pub reason: Option<String>,
}

impl WorkerResult {
    pub fn idle(worker: usize) -> Self {
        Self {
            worker,
            issue: None,
            outcome: WorkerOutcome::Idle,
            pr_number: None,
            pr_url: None,
            qa_passed: None,
            coverage_percent: None,
            attempts: 0,
            reason: Some("No issue assigned to this worker".into()),
        }
    }

    pub fn for_issue(worker: usize, issue: u64, outcome: WorkerOutcome) -> Self {
        Self {
            issue: Some(issue),
            outcome,
            reason: None,
            ..Self::idle(worker)
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == WorkerOutcome::Complete
    }
}
