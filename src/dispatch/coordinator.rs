use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info};

use super::slots::{Assignment, SlotTable};
use crate::errors::WorkflowError;
use crate::github::{EnvConfig, Issue};
use crate::roles::markers::render_result_block;
use crate::worker::{IssueTask, IssueWorker, WorkerContext, WorkerOutcome, WorkerResult};

pub const DEFAULT_WORKERS: usize = 3;

/// Counts per outcome label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeTally {
    pub complete: usize,
    pub escalate: usize,
    pub skip: usize,
    pub idle: usize,
    pub failed: usize,
    pub pending: usize,
}

impl OutcomeTally {
    /// `failed + escalate`, and nothing else.
    pub fn failures(&self) -> usize {
        self.failed + self.escalate
    }

    fn add(&mut self, outcome: WorkerOutcome) {
        match outcome {
            WorkerOutcome::Complete => self.complete += 1,
            WorkerOutcome::Escalate => self.escalate += 1,
            WorkerOutcome::Skip => self.skip += 1,
            WorkerOutcome::Idle => self.idle += 1,
            WorkerOutcome::Failed => self.failed += 1,
            WorkerOutcome::Pending => self.pending += 1,
        }
    }
}

/// Every worker's result from one dispatch, in worker order.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub results: Vec<WorkerResult>,
}

impl DispatchSummary {
    pub fn tally(&self) -> OutcomeTally {
        let mut tally = OutcomeTally::default();
        for result in &self.results {
            tally.add(result.outcome);
        }
        tally
    }

    pub fn completed(&self) -> impl Iterator<Item = &WorkerResult> {
        self.results.iter().filter(|r| r.succeeded())
    }

    pub fn failures(&self) -> impl Iterator<Item = &WorkerResult> {
        self.results.iter().filter(|r| r.outcome.is_failure())
    }

    /// Result blocks for every worker, as they would appear in a transcript.
    pub fn transcript(&self) -> String {
        self.results
            .iter()
            .map(render_result_block)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn to_report(&self) -> String {
        let tally = self.tally();
        let mut out = String::from("## Parallel Dispatch Summary\n\n| Worker | Issue | Status | PR |\n|---|---|---|---|\n");
        for r in &self.results {
            out.push_str(&format!(
                "| Worker {} | {} | WORKER_{} | {} |\n",
                r.worker,
                r.issue.map_or_else(|| "(none)".to_string(), |n| format!("#{}", n)),
                r.outcome.label(),
                r.pr_number.map_or_else(|| "N/A".to_string(), |n| format!("#{}", n)),
            ));
        }
        out.push_str(&format!(
            "\n- Successful: {}\n- Failed: {}\n- Skipped: {}\n- Idle: {}\n",
            tally.complete,
            tally.failures(),
            tally.skip,
            tally.idle
        ));
        out
    }
}

/// Fans issues out over a fixed pool of isolated workers and waits for all of them.
pub struct Coordinator {
    ctx: WorkerContext,
    workers: usize,
}

impl Coordinator {
    pub fn new(ctx: WorkerContext, workers: usize) -> Self {
        Self {
            ctx,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Assign up to `workers` issues, one per slot, then run every worker
    /// concurrently. Issues beyond the pool size are left for the next cycle.
    pub async fn dispatch(
        &self,
        repo: &str,
        issues: Vec<Issue>,
        env: &EnvConfig,
    ) -> Result<DispatchSummary, WorkflowError> {
        let mut slots = SlotTable::new(self.workers);
        for (i, issue) in issues.into_iter().take(self.workers).enumerate() {
            let number = issue.number;
            slots.assign(
                i + 1,
                Assignment {
                    task: IssueTask::new(repo, issue, self.ctx.settings.max_attempts),
                    env: env.clone(),
                },
            )?;
            info!(worker = i + 1, issue = number, "assigned");
        }
        info!(repo, workers = self.workers, assigned = slots.assigned_count(), "dispatching workers");

        let mut handles = Vec::with_capacity(self.workers);
        for n in 1..=self.workers {
            let assignment = slots.slot_for(n)?;
            let ctx = self.ctx.clone();
            handles.push(tokio::spawn(async move {
                IssueWorker::new(n, ctx).run(assignment).await
            }));
        }

        // All workers, no partial sets.
        let joined = join_all(handles).await;
        let results = joined
            .into_iter()
            .enumerate()
            .map(|(i, joined)| match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(worker = i + 1, error = %e, "worker task aborted");
                    let assigned = slots.slot_for(i + 1).ok().flatten();
                    let mut result = match assigned {
                        Some(a) => WorkerResult::for_issue(i + 1, a.task.number(), WorkerOutcome::Failed),
                        None => WorkerResult::idle(i + 1),
                    };
                    if result.outcome == WorkerOutcome::Failed {
                        result.reason = Some(format!("worker task aborted: {}", e));
                    }
                    result
                }
            })
            .collect();

        let summary = DispatchSummary { results };
        let tally = summary.tally();
        info!(
            complete = tally.complete,
            failures = tally.failures(),
            skip = tally.skip,
            idle = tally.idle,
            "all workers reported"
        );
        Ok(summary)
    }
}
