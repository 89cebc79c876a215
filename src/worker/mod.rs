//! Per-issue worker state machine.
//!
//! ```text
//! idle → checking_existing_pr → developing ⇄ coaching_retry
//!                  │                 │
//!                  │                 ╰→ qa_verifying ─┐
//!                  ╰──────────────────────────────────┴→ reporting → done
//! ```
//!
//! A worker reports exactly one [`WorkerOutcome`]. Developer attempts are
//! bounded by the task's retry ceiling; exhaustion escalates.

pub mod detect;
mod machine;
mod state;

pub use detect::find_existing_work;
pub use machine::{DEFAULT_MAX_ATTEMPTS, IssueWorker, WorkerContext, WorkerSettings};
pub use state::{IssueStatus, IssueTask, WorkerOutcome, WorkerResult, WorkerState};
