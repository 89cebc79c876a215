use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::WorkflowError;
use crate::github::EnvConfig;
use crate::worker::IssueTask;

/// State key owned by worker `n`.
pub fn slot_key(worker: usize) -> String {
    format!("issue_for_worker_{}", worker)
}

/// What a worker finds in its slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub task: IssueTask,
    pub env: EnvConfig,
}

/// Keyed assignment slots, one per worker, numbered from 1.
///
/// Written once per key by the coordinator before dispatch. Workers never see
/// the table; each receives a copy of its own slot.
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: BTreeMap<String, Option<Assignment>>,
}

impl SlotTable {
    pub fn new(workers: usize) -> Self {
        Self {
            slots: (1..=workers).map(|n| (slot_key(n), None)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn assign(&mut self, worker: usize, assignment: Assignment) -> Result<(), WorkflowError> {
        let key = slot_key(worker);
        match self.slots.get_mut(&key) {
            None => Err(WorkflowError::UnknownSlot(key)),
            Some(Some(_)) => Err(WorkflowError::SlotAlreadyAssigned(key)),
            Some(slot) => {
                *slot = Some(assignment);
                Ok(())
            }
        }
    }

    /// Copy of worker `n`'s slot, and nothing else.
    pub fn slot_for(&self, worker: usize) -> Result<Option<Assignment>, WorkflowError> {
        self.slots
            .get(&slot_key(worker))
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownSlot(slot_key(worker)))
    }

    pub fn assigned_count(&self) -> usize {
        self.slots.values().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{Issue, Priority};
    use chrono::Utc;

    fn assignment(number: u64) -> Assignment {
        Assignment {
            task: IssueTask::new(
                "acme/widgets",
                Issue {
                    number,
                    title: format!("Issue {}", number),
                    body: String::new(),
                    labels: vec![],
                    assignees: vec![],
                    created_at: Utc::now(),
                    priority: Priority::Normal,
                },
                3,
            ),
            env: EnvConfig::default(),
        }
    }

    #[test]
    fn test_keys_are_per_worker() {
        assert_eq!(slot_key(1), "issue_for_worker_1");
        let table = SlotTable::new(3);
        assert_eq!(table.len(), 3);
        assert_eq!(table.assigned_count(), 0);
    }

    #[test]
    fn test_each_slot_written_once() {
        let mut table = SlotTable::new(2);
        table.assign(1, assignment(10)).unwrap();
        let err = table.assign(1, assignment(11)).unwrap_err();
        assert!(matches!(err, WorkflowError::SlotAlreadyAssigned(ref k) if k == "issue_for_worker_1"));
        assert!(matches!(
            table.assign(5, assignment(12)),
            Err(WorkflowError::UnknownSlot(_))
        ));
    }

    #[test]
    fn test_slot_for_returns_only_own_assignment() {
        let mut table = SlotTable::new(3);
        table.assign(1, assignment(10)).unwrap();
        table.assign(2, assignment(11)).unwrap();

        assert_eq!(table.slot_for(1).unwrap().unwrap().task.number(), 10);
        assert_eq!(table.slot_for(2).unwrap().unwrap().task.number(), 11);
        assert!(table.slot_for(3).unwrap().is_none());
        assert!(table.slot_for(4).is_err());
    }
}
