//! Parallel dispatch: one exclusively-owned slot per worker, all workers run
//! concurrently, every result is collected before anything acts on them.

mod coordinator;
mod slots;

pub use coordinator::{Coordinator, DEFAULT_WORKERS, DispatchSummary, OutcomeTally};
pub use slots::{Assignment, SlotTable, slot_key};
