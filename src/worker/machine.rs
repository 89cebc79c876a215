use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};

use super::detect::find_existing_work;
use super::state::{IssueStatus, IssueTask, WorkerOutcome, WorkerResult, WorkerState};
use crate::dispatch::Assignment;
use crate::errors::WorkflowError;
use crate::github::{IssueDetail, RepoGateway, render_tree};
use crate::roles::{
    Coaching, Delivery, DeveloperBrief, DeveloperReport, QaBrief, RoleDelegate, ToolSet,
};
use crate::util::issue_branch_name;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const MAX_INVESTIGATED_FILES: usize = 3;

static FILE_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\w./-]+\.(?:py|js|jsx|ts|tsx|rs|go|java|kt|rb|cs|json|ya?ml|toml|cfg|ini|txt|md|sh)\b",
    )
    .unwrap()
});

/// Knobs a worker needs from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub max_attempts: u32,
    pub base_branch: String,
    pub min_coverage: f64,
    pub min_mutation_score: f64,
    /// Offer mutation testing to QA.
    pub require_mutation: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_branch: "main".into(),
            min_coverage: 80.0,
            min_mutation_score: 60.0,
            require_mutation: false,
        }
    }
}

/// Shared, read-mostly handles every worker gets a clone of.
#[derive(Clone)]
pub struct WorkerContext {
    pub gateway: Arc<dyn RepoGateway>,
    pub delegate: Arc<dyn RoleDelegate>,
    pub settings: WorkerSettings,
}

/// Per-issue supervisor: check for existing work, develop with bounded coaching
/// retries, verify, report.
pub struct IssueWorker {
    index: usize,
    ctx: WorkerContext,
    state: WorkerState,
    history: Vec<WorkerState>,
}

impl IssueWorker {
    pub fn new(index: usize, ctx: WorkerContext) -> Self {
        Self {
            index,
            ctx,
            state: WorkerState::Idle,
            history: vec![WorkerState::Idle],
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Every state visited, in order.
    pub fn history(&self) -> &[WorkerState] {
        &self.history
    }

    fn enter(&mut self, next: WorkerState) {
        debug!(worker = self.index, from = ?self.state, to = ?next, "worker state");
        self.state = next;
        self.history.push(next);
    }

    fn report(&mut self, result: WorkerResult) -> WorkerResult {
        self.enter(WorkerState::Reporting);
        info!(
            worker = self.index,
            issue = ?result.issue,
            outcome = %result.outcome,
            attempts = result.attempts,
            "worker reporting"
        );
        self.enter(WorkerState::Done);
        result
    }

    /// Run one assignment to a terminal outcome. `None` means this worker's slot
    /// was empty.
    pub async fn run(&mut self, assignment: Option<Assignment>) -> WorkerResult {
        let Some(Assignment { mut task, env }) = assignment else {
            return self.report(WorkerResult::idle(self.index));
        };
        match self.supervise(&mut task, &env).await {
            Ok(result) => self.report(result),
            Err(e) => {
                warn!(worker = self.index, issue = task.number(), error = %e, "worker failed");
                let mut result = WorkerResult::for_issue(self.index, task.number(), WorkerOutcome::Failed);
                result.attempts = task.retries;
                result.pr_number = task.pr_number;
                result.reason = Some(e.to_string());
                if task.status().can_transition_to(IssueStatus::Failed) {
                    let _ = task.transition(IssueStatus::Failed);
                }
                self.report(result)
            }
        }
    }

    async fn supervise(
        &mut self,
        task: &mut IssueTask,
        env: &crate::github::EnvConfig,
    ) -> Result<WorkerResult, WorkflowError> {
        let number = task.number();
        let repo = task.repo.clone();

        self.enter(WorkerState::CheckingExistingPr);
        let detail = match self.ctx.gateway.get_issue(&repo, number).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(worker = self.index, issue = number, error = %e, "issue detail unavailable, using summary");
                IssueDetail {
                    issue: task.issue.clone(),
                    comments: Vec::new(),
                }
            }
        };
        if let Some(found) = find_existing_work(&detail) {
            info!(worker = self.index, issue = number, found = %found, "issue already has work, skipping");
            let mut result = WorkerResult::for_issue(self.index, number, WorkerOutcome::Skip);
            result.reason = Some(format!("Already has PR (found: {})", found));
            return Ok(result);
        }

        task.transition(IssueStatus::InProgress)?;
        let branch = issue_branch_name(number, &task.issue.title);
        let delivery = match self.develop(task, &detail, &branch, env, None).await? {
            Ok(delivery) => delivery,
            Err(investigation) => {
                task.transition(IssueStatus::Failed)?;
                let mut result = WorkerResult::for_issue(self.index, number, WorkerOutcome::Escalate);
                result.attempts = task.retries;
                result.reason = Some(investigation);
                return Ok(result);
            }
        };

        let pr_number = delivery.pr_number.unwrap_or_default();
        task.pr_number = Some(pr_number);
        task.transition(IssueStatus::PrCreated)?;

        self.enter(WorkerState::QaVerifying);
        task.transition(IssueStatus::QaInProgress)?;
        let brief = QaBrief {
            repo: repo.clone(),
            issue_number: number,
            pr_number,
            pr_url: delivery.pr_url.clone().unwrap_or_default(),
            branch: delivery.branch.clone().unwrap_or(branch),
            env: env.clone(),
            min_coverage: self.ctx.settings.min_coverage,
            min_mutation_score: self.ctx.settings.min_mutation_score,
            tools: ToolSet::qa(self.ctx.settings.require_mutation),
        };
        let (qa_passed, coverage, qa_reason) = match self.ctx.delegate.verify(&brief).await {
            Ok(report) => (report.passed(), report.coverage_percent, (!report.passed()).then_some(report.feedback)),
            Err(e) => {
                warn!(worker = self.index, issue = number, error = %e, "qa delegation failed");
                (false, None, Some(e.to_string()))
            }
        };
        task.transition(if qa_passed {
            IssueStatus::QaPassed
        } else {
            IssueStatus::QaFailed
        })?;
        task.transition(IssueStatus::Completed)?;

        Ok(WorkerResult {
            worker: self.index,
            issue: Some(number),
            outcome: WorkerOutcome::Complete,
            pr_number: Some(pr_number),
            pr_url: delivery.pr_url,
            qa_passed: Some(qa_passed),
            coverage_percent: coverage,
            attempts: task.retries,
            reason: qa_reason,
        })
    }

    /// Delegate to the developer until it delivers a PR or attempts run out.
    /// `Ok(Err(summary))` is exhaustion, carrying the last investigation.
    /// `review_feedback` is set when a quality gate sent the work back.
    pub async fn develop(
        &mut self,
        task: &mut IssueTask,
        detail: &IssueDetail,
        branch: &str,
        env: &crate::github::EnvConfig,
        review_feedback: Option<String>,
    ) -> Result<Result<Delivery, String>, WorkflowError> {
        let max = task.max_retries.max(1);
        let mut coaching: Option<Coaching> = None;
        let mut last_investigation = String::new();

        for attempt in 1..=max {
            self.enter(WorkerState::Developing);
            task.retries = attempt;
            let brief = DeveloperBrief {
                repo: task.repo.clone(),
                issue: detail.clone(),
                branch: branch.to_string(),
                base: self.ctx.settings.base_branch.clone(),
                env: env.clone(),
                attempt,
                max_attempts: max,
                coaching: coaching.take(),
                review_feedback: review_feedback.clone(),
                tools: ToolSet::developer(),
            };
            info!(worker = self.index, issue = task.number(), attempt, max, "delegating to developer");

            let reason = match self.ctx.delegate.develop(&brief).await? {
                DeveloperReport::Complete(delivery) if delivery.pr_number.is_some() => {
                    return Ok(Ok(delivery));
                }
                DeveloperReport::Complete(_) => {
                    "developer reported completion without a pull request number".to_string()
                }
                DeveloperReport::Blocked { reason } => reason,
            };
            warn!(worker = self.index, issue = task.number(), attempt, reason = %reason, "developer blocked");

            self.enter(WorkerState::CoachingRetry);
            let guidance = self.investigate(&task.repo, branch, &reason, attempt, max).await;
            last_investigation = format!(
                "BLOCKED_AFTER_RETRIES\n- Attempts: {}\n- Last Error: {}\n- Investigation: {}\n- Suggestion for Tech Lead: {}",
                attempt, reason, guidance.problem, guidance.suggestion
            );
            if attempt < max {
                coaching = Some(guidance);
            }
        }
        Ok(Err(last_investigation))
    }

    /// Read the repository to turn a blocker into specific guidance.
    async fn investigate(
        &self,
        repo: &str,
        branch: &str,
        reason: &str,
        attempt: u32,
        max_attempts: u32,
    ) -> Coaching {
        let gateway = &self.ctx.gateway;
        let base = &self.ctx.settings.base_branch;

        let layout = match gateway.list_directory(repo, "", base).await {
            Ok(entries) => Some(render_tree("/", &entries)),
            Err(e) => {
                warn!(worker = self.index, error = %e, "directory listing failed during coaching");
                None
            }
        };

        let mut seen = HashSet::new();
        let files: Vec<String> = FILE_MENTION
            .find_iter(reason)
            .map(|m| m.as_str().trim_start_matches("./").to_string())
            .filter(|path| seen.insert(path.clone()))
            .take(MAX_INVESTIGATED_FILES)
            .collect();

        let mut findings = Vec::new();
        for path in &files {
            let on_branch = gateway.get_file(repo, path, branch).await;
            let content = match on_branch {
                Ok(content) => Ok(content),
                Err(_) => gateway.get_file(repo, path, base).await,
            };
            match content {
                Ok(content) => findings.push(format!("{} exists ({} lines)", path, content.lines().count())),
                Err(e) if e.is_not_found() => findings.push(format!("{} does not exist", path)),
                Err(e) => findings.push(format!("{} unreadable: {}", path, e)),
            }
        }

        let suggestion = if findings.iter().any(|f| f.ends_with("does not exist")) {
            "Create the missing files with complete content, then rerun the tests before pushing".to_string()
        } else if !files.is_empty() {
            format!("Read {} in full and fix the error at its source", files.join(", "))
        } else {
            "Reproduce the failure in the sandbox first and read the full error output".to_string()
        };

        let mut problem = reason.to_string();
        if !findings.is_empty() {
            problem.push_str(&format!(" ({})", findings.join("; ")));
        }

        Coaching {
            problem,
            suggestion,
            files,
            layout,
            attempt: attempt + 1,
            max_attempts,
        }
    }
}
