//! CI monitor: poll a commit's CI status until it settles or time runs out.
//!
//! ```text
//! polling ──► success
//!    │  ╲───► failure    (failed jobs fetched)
//!    │   ╲──► cancelled
//!    ╰──────► timeout    (wall-clock ceiling)
//! ```
//!
//! A failed status query is logged and counts as "no news this tick"; only the
//! timeout ends a loop that never observes a terminal status.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::github::{CiStatus, FailedJob, RepoGateway};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CI_TIMEOUT: Duration = Duration::from_secs(600);

/// How a monitoring loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CiOutcome {
    Success,
    Failure,
    Cancelled,
    /// No terminal status before the ceiling. Not the same as a failure: retry
    /// with a longer wait, or inspect the runs by hand.
    TimedOut,
}

impl std::fmt::Display for CiOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CiOutcome::Success => "success",
            CiOutcome::Failure => "failure",
            CiOutcome::Cancelled => "cancelled",
            CiOutcome::TimedOut => "timeout",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CiRunResult {
    pub outcome: CiOutcome,
    /// Last status actually observed; `Unknown` when every query failed.
    pub status: CiStatus,
    pub elapsed: Duration,
    pub polls: u32,
    pub failed_jobs: Vec<FailedJob>,
    pub log_excerpt: String,
}

impl CiRunResult {
    pub fn passed(&self) -> bool {
        self.outcome == CiOutcome::Success
    }

    pub fn to_report(&self) -> String {
        let mut out = format!(
            "## CI Result\n\n**Outcome:** {}\n**Last Status:** {}\n**Elapsed:** {}s over {} poll(s)\n",
            self.outcome.to_string().to_uppercase(),
            self.status,
            self.elapsed.as_secs(),
            self.polls
        );
        match self.outcome {
            CiOutcome::Failure if !self.log_excerpt.is_empty() => {
                out.push_str(&format!("\n### Failed Jobs\n{}\n", self.log_excerpt));
            }
            CiOutcome::TimedOut => out.push_str(
                "\nCI did not finish in time. Retry with a longer timeout or inspect the runs manually.\n",
            ),
            _ => {}
        }
        out
    }
}

fn render_failed_jobs(jobs: &[FailedJob]) -> String {
    jobs.iter()
        .map(|job| {
            if job.failed_steps.is_empty() {
                format!("- {}", job.name)
            } else {
                format!("- {}: {}", job.name, job.failed_steps.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct CiMonitor {
    gateway: Arc<dyn RepoGateway>,
    interval: Duration,
    timeout: Duration,
}

impl CiMonitor {
    pub fn new(gateway: Arc<dyn RepoGateway>) -> Self {
        Self {
            gateway,
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_CI_TIMEOUT,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Poll until `sha` reaches a terminal CI status or the timeout fires.
    pub async fn watch(&self, repo: &str, sha: &str) -> CiRunResult {
        let started = Instant::now();
        let mut polls = 0u32;
        let mut last = CiStatus::Unknown;

        loop {
            polls += 1;
            match self.gateway.ci_status(repo, sha).await {
                Ok(status) => {
                    debug!(repo, sha, poll = polls, status = %status, "ci poll");
                    last = status;
                }
                Err(e) => {
                    warn!(repo, sha, poll = polls, error = %e, "ci status query failed, retrying");
                }
            }

            let outcome = match last {
                CiStatus::Success => Some(CiOutcome::Success),
                CiStatus::Failure => Some(CiOutcome::Failure),
                CiStatus::Cancelled => Some(CiOutcome::Cancelled),
                _ => None,
            };
            if let Some(outcome) = outcome {
                return self.finish(repo, sha, outcome, last, started.elapsed(), polls).await;
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                return self
                    .finish(repo, sha, CiOutcome::TimedOut, last, elapsed, polls)
                    .await;
            }
            tokio::time::sleep(self.interval.min(self.timeout - elapsed)).await;
        }
    }

    async fn finish(
        &self,
        repo: &str,
        sha: &str,
        outcome: CiOutcome,
        status: CiStatus,
        elapsed: Duration,
        polls: u32,
    ) -> CiRunResult {
        let failed_jobs = if outcome == CiOutcome::Failure {
            self.gateway.failed_jobs(repo, sha).await.unwrap_or_else(|e| {
                warn!(repo, sha, error = %e, "failed-job lookup unavailable");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        info!(repo, sha, outcome = %outcome, elapsed_secs = elapsed.as_secs(), polls, "ci monitoring finished");
        CiRunResult {
            outcome,
            status,
            elapsed,
            polls,
            log_excerpt: render_failed_jobs(&failed_jobs),
            failed_jobs,
        }
    }
}
