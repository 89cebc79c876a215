//! Top-level sequencer.
//!
//! Scans the backlog, runs workers (one at a time, or a parallel batch through
//! the [`Coordinator`]), then reviews every delivered PR against the quality
//! gate itself. A rejected PR goes back to the developer with itemized feedback,
//! bounded by `max_review_rounds`. The loop ends when a scan finds no new issue.

pub mod gate;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::ci::CiMonitor;
use crate::dispatch::{Assignment, Coordinator};
use crate::errors::WorkflowError;
use crate::github::{EnvConfig, Issue, RepoGateway, build_env_config};
use crate::roles::Mission;
use crate::sandbox::{BranchRunner, BranchTarget, MutationScore};
use crate::util::issue_branch_name;
use crate::worker::{IssueTask, IssueWorker, WorkerContext, WorkerOutcome, WorkerResult};

pub use gate::{Criterion, GateFinding, GateInput, GateThresholds, GateVerdict, evaluate};

const MAX_REVIEWED_FILES: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencerSettings {
    pub parallel: bool,
    pub workers: usize,
    pub gate: GateThresholds,
    pub max_review_rounds: u32,
    pub ci_poll_interval: Duration,
    pub ci_timeout: Duration,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            parallel: false,
            workers: crate::dispatch::DEFAULT_WORKERS,
            gate: GateThresholds::default(),
            max_review_rounds: 2,
            ci_poll_interval: crate::ci::DEFAULT_POLL_INTERVAL,
            ci_timeout: crate::ci::DEFAULT_CI_TIMEOUT,
        }
    }
}

/// Optional sandbox measurement of each PR head, overriding QA-reported numbers.
pub struct Measurement {
    pub runner: BranchRunner,
    pub image: Option<String>,
    pub setup: Vec<String>,
    pub coverage_command: String,
    /// `(baseline, mutation)` commands.
    pub mutation_commands: Option<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Complete,
    /// Backlog was empty.
    Idle,
    Failed,
    DryRun,
}

/// What happened to one issue across the whole run.
#[derive(Debug, Clone, Serialize)]
pub struct IssueOutcome {
    pub issue: u64,
    pub worker: WorkerResult,
    /// `Some(true)` once approved, `Some(false)` when review rounds ran out.
    pub approved: Option<bool>,
    pub review_rounds: u32,
    pub feedback: Option<String>,
}

impl IssueOutcome {
    pub fn is_failure(&self) -> bool {
        self.worker.outcome.is_failure() || self.approved == Some(false)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionReport {
    pub status: MissionStatus,
    pub repo: String,
    pub issues: Vec<IssueOutcome>,
    pub duration: Duration,
    pub summary: String,
    pub error: Option<String>,
    /// Mission text, for dry runs.
    pub mission: Option<String>,
}

impl MissionReport {
    pub fn dry_run(mission: &Mission) -> Self {
        Self {
            status: MissionStatus::DryRun,
            repo: mission.repo.clone(),
            issues: Vec::new(),
            duration: Duration::ZERO,
            summary: String::new(),
            error: None,
            mission: Some(mission.to_text()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status != MissionStatus::Failed
    }

    pub fn pr_urls(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter_map(|o| o.worker.pr_url.as_deref())
            .collect()
    }
}

fn render_summary(issues: &[IssueOutcome]) -> String {
    if issues.is_empty() {
        return "Inbox Zero: no assigned issues to process.".to_string();
    }
    let mut out = String::from("| Issue | Status | PR | Review |\n|---|---|---|---|\n");
    for o in issues {
        out.push_str(&format!(
            "| #{} | WORKER_{} | {} | {} |\n",
            o.issue,
            o.worker.outcome.label(),
            o.worker.pr_url.as_deref().unwrap_or("N/A"),
            match o.approved {
                Some(true) => format!("approved after {} round(s)", o.review_rounds),
                Some(false) => format!("rejected after {} round(s)", o.review_rounds),
                None => "-".to_string(),
            }
        ));
    }
    let failures = issues.iter().filter(|o| o.is_failure()).count();
    out.push_str(&format!(
        "\nMISSION_STATUS: {}\n",
        if failures == 0 { "COMPLETE" } else { "FAILED" }
    ));
    out
}

pub struct Sequencer {
    gateway: Arc<dyn RepoGateway>,
    worker_ctx: WorkerContext,
    settings: SequencerSettings,
    ci: CiMonitor,
    measurement: Option<Measurement>,
}

impl Sequencer {
    pub fn new(worker_ctx: WorkerContext, settings: SequencerSettings) -> Self {
        let gateway = worker_ctx.gateway.clone();
        let ci = CiMonitor::new(gateway.clone())
            .with_interval(settings.ci_poll_interval)
            .with_timeout(settings.ci_timeout);
        Self {
            gateway,
            worker_ctx,
            settings,
            ci,
            measurement: None,
        }
    }

    pub fn with_measurement(mut self, measurement: Measurement) -> Self {
        self.measurement = Some(measurement);
        self
    }

    pub async fn run(&self, mission: &Mission) -> MissionReport {
        let started = Instant::now();
        info!(repo = %mission.repo, issue = ?mission.issue, parallel = self.settings.parallel, "mission starting");

        let result = match mission.issue {
            Some(n) => self.run_single(&mission.repo, n).await,
            None => self.run_backlog(&mission.repo).await,
        };

        let duration = started.elapsed();
        match result {
            Ok(issues) => {
                let status = if issues.is_empty() {
                    MissionStatus::Idle
                } else if issues.iter().any(IssueOutcome::is_failure) {
                    MissionStatus::Failed
                } else {
                    MissionStatus::Complete
                };
                let failures: Vec<String> = issues
                    .iter()
                    .filter(|o| o.is_failure())
                    .map(|o| {
                        format!(
                            "#{}: {}",
                            o.issue,
                            o.worker
                                .reason
                                .clone()
                                .or_else(|| o.feedback.clone())
                                .unwrap_or_else(|| o.worker.outcome.to_string())
                        )
                    })
                    .collect();
                info!(repo = %mission.repo, status = ?status, issues = issues.len(), "mission finished");
                MissionReport {
                    status,
                    repo: mission.repo.clone(),
                    summary: render_summary(&issues),
                    error: (!failures.is_empty()).then(|| failures.join("\n")),
                    issues,
                    duration,
                    mission: None,
                }
            }
            Err(e) => {
                error!(repo = %mission.repo, error = %e, "mission failed");
                MissionReport {
                    status: MissionStatus::Failed,
                    repo: mission.repo.clone(),
                    issues: Vec::new(),
                    duration,
                    summary: String::new(),
                    error: Some(e.to_string()),
                    mission: None,
                }
            }
        }
    }

    async fn run_single(&self, repo: &str, number: u64) -> Result<Vec<IssueOutcome>, WorkflowError> {
        let detail = self.gateway.get_issue(repo, number).await?;
        let env = build_env_config(self.gateway.as_ref(), repo, &self.worker_ctx.settings.base_branch).await;
        let result = self.run_worker(repo, detail.issue, &env).await;
        Ok(vec![self.review(repo, result, &env).await])
    }

    async fn run_backlog(&self, repo: &str) -> Result<Vec<IssueOutcome>, WorkflowError> {
        let mut processed: HashSet<u64> = HashSet::new();
        let mut outcomes = Vec::new();
        let mut cached_env: Option<EnvConfig> = None;

        loop {
            let backlog: Vec<Issue> = self
                .gateway
                .list_assigned_issues(repo)
                .await?
                .into_iter()
                .filter(|i| !processed.contains(&i.number))
                .collect();
            if backlog.is_empty() {
                info!(repo, processed = processed.len(), "backlog empty");
                break;
            }
            info!(repo, new = backlog.len(), "backlog scan");

            // Built once, on the first non-empty scan.
            if cached_env.is_none() {
                cached_env =
                    Some(build_env_config(self.gateway.as_ref(), repo, &self.worker_ctx.settings.base_branch).await);
            }
            let env = cached_env.clone().unwrap_or_default();

            let results = if self.settings.parallel {
                let coordinator = Coordinator::new(self.worker_ctx.clone(), self.settings.workers);
                let batch: Vec<Issue> = backlog.into_iter().take(coordinator.workers()).collect();
                processed.extend(batch.iter().map(|i| i.number));
                coordinator
                    .dispatch(repo, batch, &env)
                    .await?
                    .results
                    .into_iter()
                    .filter(|r| r.issue.is_some())
                    .collect::<Vec<_>>()
            } else {
                let next = backlog.into_iter().next();
                match next {
                    Some(issue) => {
                        processed.insert(issue.number);
                        vec![self.run_worker(repo, issue, &env).await]
                    }
                    None => Vec::new(),
                }
            };

            for result in results {
                outcomes.push(self.review(repo, result, &env).await);
            }
        }
        Ok(outcomes)
    }

    async fn run_worker(&self, repo: &str, issue: Issue, env: &EnvConfig) -> WorkerResult {
        let assignment = Assignment {
            task: IssueTask::new(repo, issue, self.worker_ctx.settings.max_attempts),
            env: env.clone(),
        };
        IssueWorker::new(1, self.worker_ctx.clone())
            .run(Some(assignment))
            .await
    }

    /// Quality-gate loop for one delivered PR.
    async fn review(&self, repo: &str, mut worker: WorkerResult, env: &EnvConfig) -> IssueOutcome {
        let issue = worker.issue.unwrap_or_default();
        let mut outcome = IssueOutcome {
            issue,
            worker: worker.clone(),
            approved: None,
            review_rounds: 0,
            feedback: None,
        };
        if worker.outcome != WorkerOutcome::Complete {
            return outcome;
        }
        let Some(mut pr_number) = worker.pr_number else {
            return outcome;
        };

        let max_rounds = self.settings.max_review_rounds.max(1);
        for round in 1..=max_rounds {
            outcome.review_rounds = round;
            let verdict = match self.inspect(repo, pr_number, worker.coverage_percent, env).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(repo, pr = pr_number, error = %e, "PR review unavailable");
                    outcome.approved = Some(false);
                    outcome.feedback = Some(e.to_string());
                    return outcome;
                }
            };
            if verdict.passed() {
                info!(repo, pr = pr_number, round, "quality gate passed");
                outcome.approved = Some(true);
                outcome.worker = worker;
                return outcome;
            }

            let feedback = verdict.to_feedback(pr_number);
            info!(repo, pr = pr_number, round, findings = verdict.findings.len(), "quality gate rejected");
            if let Err(e) = self.gateway.add_comment(repo, pr_number, &feedback).await {
                warn!(repo, pr = pr_number, error = %e, "failed to post review feedback");
            }
            outcome.feedback = Some(feedback.clone());
            if round == max_rounds {
                break;
            }

            match self.redevelop(repo, issue, env, feedback).await {
                Ok(Some(updated)) => {
                    pr_number = updated.pr_number.unwrap_or(pr_number);
                    worker.pr_number = Some(pr_number);
                    worker.pr_url = updated.pr_url.or(worker.pr_url);
                }
                Ok(None) => {
                    worker.outcome = WorkerOutcome::Escalate;
                    worker.reason = Some("developer blocked while addressing review feedback".into());
                    break;
                }
                Err(e) => {
                    worker.outcome = WorkerOutcome::Failed;
                    worker.reason = Some(e.to_string());
                    break;
                }
            }
        }

        outcome.approved = Some(false);
        outcome.worker = worker;
        outcome
    }

    /// Send the issue back to the developer with review feedback.
    async fn redevelop(
        &self,
        repo: &str,
        issue: u64,
        env: &EnvConfig,
        feedback: String,
    ) -> Result<Option<crate::roles::Delivery>, WorkflowError> {
        let detail = self.gateway.get_issue(repo, issue).await?;
        let branch = issue_branch_name(issue, &detail.issue.title);
        let mut task = IssueTask::new(repo, detail.issue.clone(), self.worker_ctx.settings.max_attempts);
        let mut worker = IssueWorker::new(1, self.worker_ctx.clone());
        Ok(worker
            .develop(&mut task, &detail, &branch, env, Some(feedback))
            .await?
            .ok())
    }

    /// Gather everything the gate needs for one PR, then evaluate.
    async fn inspect(
        &self,
        repo: &str,
        pr_number: u64,
        reported_coverage: Option<f64>,
        env: &EnvConfig,
    ) -> Result<GateVerdict, WorkflowError> {
        let pr = self.gateway.get_pr(repo, pr_number).await?;

        let ci = if pr.ci_status.is_terminal() {
            pr.ci_status
        } else {
            // A timeout leaves the last observed, non-success status.
            self.ci.watch(repo, &pr.head_sha).await.status
        };

        let (coverage, mutation) = self.measure(repo, &pr.head_branch, reported_coverage, env).await;

        let mut files = Vec::new();
        for path in pr.files_changed.iter().take(MAX_REVIEWED_FILES) {
            match self.gateway.get_file(repo, path, &pr.head_branch).await {
                Ok(content) => files.push((path.clone(), content)),
                // Deleted in this PR.
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(repo, path = %path, error = %e, "changed file unreadable during review"),
            }
        }

        Ok(evaluate(
            &GateInput {
                pr: &pr,
                ci,
                coverage_percent: coverage,
                mutation,
                files: &files,
            },
            &self.settings.gate,
        ))
    }

    async fn measure(
        &self,
        repo: &str,
        branch: &str,
        reported: Option<f64>,
        env: &EnvConfig,
    ) -> (Option<f64>, Option<MutationScore>) {
        let Some(m) = &self.measurement else {
            return (reported, None);
        };
        let mut target = BranchTarget::new(repo, branch)
            .setup(m.setup.clone())
            .env(env.sandbox_env());
        if let Some(image) = &m.image {
            target = target.image(image.clone());
        }
        let run = m.runner.run_coverage(&target, &m.coverage_command).await;
        let coverage = run.coverage_percent.or(reported);
        let mutation = match &m.mutation_commands {
            Some((baseline, mutation)) => Some(m.runner.run_mutation_tests(&target, baseline, mutation).await.score),
            None => None,
        };
        (coverage, mutation)
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("settings", &self.settings)
            .field("measurement", &self.measurement.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{CiStatus, EnvTemplate, PrRecord, PrStatus, Priority};
    use std::collections::BTreeMap;
    use crate::roles::{Delivery, DeveloperReport, QaReport, QaVerdict};
    use crate::sandbox::{ExecutionResult, OutputLimits, SandboxConfig};
    use crate::test_support::{FakeSandbox, MockGateway, ScriptedDelegate};
    use crate::worker::WorkerSettings;
    use chrono::{TimeZone, Utc};

    fn issue(number: u64, labels: &[&str], day: u32) -> Issue {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        Issue {
            number,
            title: format!("Bug {}", number),
            body: "broken".into(),
            priority: Priority::from_labels(&labels),
            labels,
            assignees: vec!["nightwatch-bot".into()],
            created_at: Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap(),
        }
    }

    fn pr(number: u64, mergeable: Option<bool>) -> PrRecord {
        PrRecord {
            number,
            url: format!("https://github.com/acme/widgets/pull/{}", number),
            title: "Fix".into(),
            body: String::new(),
            author: "nightwatch-bot".into(),
            head_branch: format!("fix-{}", number),
            base_branch: "main".into(),
            head_sha: format!("sha{}", number),
            status: PrStatus::Open,
            mergeable,
            files_changed: vec!["src/app.py".into()],
            ci_status: CiStatus::Success,
        }
    }

    fn delivered(pr: u64) -> DeveloperReport {
        DeveloperReport::Complete(Delivery {
            branch: Some(format!("fix-{}", pr)),
            pr_number: Some(pr),
            pr_url: Some(format!("https://github.com/acme/widgets/pull/{}", pr)),
            summary: String::new(),
        })
    }

    fn qa_pass(coverage: f64) -> QaReport {
        QaReport {
            verdict: QaVerdict::Pass,
            coverage_percent: Some(coverage),
            feedback: String::new(),
        }
    }

    fn sequencer(gateway: &Arc<MockGateway>, delegate: &Arc<ScriptedDelegate>, settings: SequencerSettings) -> Sequencer {
        Sequencer::new(
            WorkerContext {
                gateway: gateway.clone(),
                delegate: delegate.clone(),
                settings: WorkerSettings::default(),
            },
            settings,
        )
    }

    #[tokio::test]
    async fn test_empty_backlog_is_idle() {
        let gateway = Arc::new(MockGateway::new());
        let delegate = Arc::new(ScriptedDelegate::new());
        let report = sequencer(&gateway, &delegate, SequencerSettings::default())
            .run(&Mission::new("acme/widgets", None))
            .await;
        assert_eq!(report.status, MissionStatus::Idle);
        assert!(report.succeeded());
        assert!(report.summary.contains("Inbox Zero"));
    }

    #[tokio::test]
    async fn test_sequential_processes_backlog_in_priority_order() {
        let gateway = Arc::new(MockGateway::new());
        gateway.add_issue(issue(3, &["bug"], 1), vec![]);
        gateway.add_issue(issue(42, &["P0"], 5), vec![]);
        gateway.set_pr(pr(17, Some(true)));
        gateway.set_pr(pr(18, Some(true)));
        gateway.set_file("src/app.py", "def add(a, b):\n    return a + b\n");

        let delegate = Arc::new(ScriptedDelegate::new());
        delegate.push_developer(Ok(delivered(17)));
        delegate.push_developer(Ok(delivered(18)));
        delegate.push_qa(Ok(qa_pass(85.0)));
        delegate.push_qa(Ok(qa_pass(90.0)));

        let report = sequencer(&gateway, &delegate, SequencerSettings::default())
            .run(&Mission::new("acme/widgets", None))
            .await;

        assert_eq!(report.status, MissionStatus::Complete, "{:?}", report.error);
        let order: Vec<u64> = report.issues.iter().map(|o| o.issue).collect();
        assert_eq!(order, vec![42, 3]);
        assert!(report.issues.iter().all(|o| o.approved == Some(true)));
        assert_eq!(report.pr_urls().len(), 2);
        assert!(gateway.comments().is_empty());
    }

    #[tokio::test]
    async fn test_gate_rejection_posts_feedback_and_redelegates() {
        let gateway = Arc::new(MockGateway::new());
        gateway.add_issue(issue(42, &[], 1), vec![]);
        gateway.set_pr(pr(17, Some(true)));
        gateway.set_file("src/app.py", "def add(a, b):\n    return a + b\n");

        let delegate = Arc::new(ScriptedDelegate::new());
        delegate.push_developer(Ok(delivered(17)));
        // QA reports coverage one point short.
        delegate.push_qa(Ok(qa_pass(79.0)));
        delegate.push_developer(Ok(delivered(17)));

        let report = sequencer(&gateway, &delegate, SequencerSettings::default())
            .run(&Mission::new("acme/widgets", Some(42)))
            .await;

        let comments = gateway.comments();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].0, 17);
        assert!(comments[0].1.starts_with("## Code Review Feedback"));
        assert!(comments[0].1.contains("Coverage 79.0%"));

        let briefs = delegate.developer_briefs();
        assert_eq!(briefs.len(), 2);
        assert!(briefs[1].review_feedback.as_deref().unwrap().contains("Coverage"));

        assert_eq!(report.status, MissionStatus::Failed);
        assert_eq!(report.issues[0].approved, Some(false));
        assert_eq!(report.issues[0].review_rounds, 2);
    }

    #[tokio::test]
    async fn test_parallel_mode_reviews_completed_workers_only() {
        let gateway = Arc::new(MockGateway::new());
        gateway.add_issue(issue(1, &[], 1), vec![]);
        gateway.set_pr(pr(7, Some(true)));
        gateway.set_file("src/app.py", "x = 1\n");
        let delegate = Arc::new(ScriptedDelegate::new());
        delegate.push_developer(Ok(delivered(7)));
        delegate.push_qa(Ok(qa_pass(100.0)));

        let settings = SequencerSettings {
            parallel: true,
            workers: 3,
            ..Default::default()
        };
        let report = sequencer(&gateway, &delegate, settings)
            .run(&Mission::new("acme/widgets", None).parallel(3))
            .await;
        assert_eq!(report.status, MissionStatus::Complete, "{:?}", report.error);
        // Idle workers are not issues.
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].approved, Some(true));
    }

    #[tokio::test]
    async fn test_missing_issue_fails_mission() {
        let gateway = Arc::new(MockGateway::new());
        let delegate = Arc::new(ScriptedDelegate::new());
        let report = sequencer(&gateway, &delegate, SequencerSettings::default())
            .run(&Mission::new("acme/widgets", Some(404)))
            .await;
        assert_eq!(report.status, MissionStatus::Failed);
        assert!(report.error.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_sandbox_measurement_overrides_reported_coverage() {
        let gateway = Arc::new(MockGateway::new());
        gateway.add_issue(issue(42, &[], 1), vec![]);
        gateway.set_pr(pr(17, Some(true)));
        gateway.set_file("src/app.py", "x = 1\n");
        let delegate = Arc::new(ScriptedDelegate::new());
        delegate.push_developer(Ok(delivered(17)));
        delegate.push_qa(Ok(qa_pass(95.0)));

        let fake = Arc::new(FakeSandbox::new());
        fake.push(ExecutionResult::completed(
            0,
            "12 passed, 2 failed\nTOTAL 100 20 80%",
            "",
            Duration::ZERO,
            OutputLimits::STANDARD,
        ));
        let runner = BranchRunner::new(fake.clone(), SandboxConfig::default(), "ghp_token");
        let settings = SequencerSettings {
            max_review_rounds: 1,
            ..Default::default()
        };
        let report = sequencer(&gateway, &delegate, settings)
            .with_measurement(Measurement {
                runner,
                image: None,
                setup: vec![],
                coverage_command: "pytest --cov".into(),
                mutation_commands: None,
            })
            .run(&Mission::new("acme/widgets", Some(42)))
            .await;

        assert_eq!(report.issues[0].approved, Some(true), "{:?}", report.issues[0].feedback);
        assert!(fake.requests()[0].script().contains("--branch 'fix-17'"));
    }

    #[tokio::test]
    async fn test_measurement_runs_with_repository_variables() {
        let gateway = Arc::new(MockGateway::new());
        gateway.add_issue(issue(42, &[], 1), vec![]);
        gateway.set_pr(pr(17, Some(true)));
        gateway.set_file("src/app.py", "x = 1\n");
        gateway.set_variables(BTreeMap::from([("LOG_LEVEL".to_string(), "debug".to_string())]));
        gateway.set_env_template(EnvTemplate {
            file: ".env.example".into(),
            content: "LOG_LEVEL=\nDATABASE_URL=\n".into(),
            variables: vec!["LOG_LEVEL".into(), "DATABASE_URL".into()],
        });
        let delegate = Arc::new(ScriptedDelegate::new());
        delegate.push_developer(Ok(delivered(17)));
        delegate.push_qa(Ok(qa_pass(90.0)));

        let fake = Arc::new(FakeSandbox::new());
        fake.push_output(0, "3 passed\nTOTAL 10 1 90%", "");
        let settings = SequencerSettings {
            max_review_rounds: 1,
            ..Default::default()
        };
        sequencer(&gateway, &delegate, settings)
            .with_measurement(Measurement {
                runner: BranchRunner::new(fake.clone(), SandboxConfig::default(), "ghp_token"),
                image: None,
                setup: vec![],
                coverage_command: "pytest --cov".into(),
                mutation_commands: None,
            })
            .run(&Mission::new("acme/widgets", Some(42)))
            .await;

        let env = &fake.requests()[0].env;
        assert_eq!(env.get("LOG_LEVEL").map(String::as_str), Some("debug"));
        // Unresolved names are not invented.
        assert!(!env.contains_key("DATABASE_URL"));
        assert_eq!(env.get("GITHUB_TOKEN").map(String::as_str), Some("ghp_token"));
    }
}
