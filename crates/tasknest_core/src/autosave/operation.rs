//! Auto-save operations and immutable collection snapshots.
//!
//! # Invariants
//! - Snapshots are never mutated after construction; every change produces
//!   a new `Snapshot`.
//! - `optimistic` is the collection with the operation applied, `rollback`
//!   the collection exactly as it was before.

use crate::model::task::{now_epoch_ms, Task, TaskId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Shared immutable view of the whole task collection.
pub type Snapshot = Arc<[Task]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation payload; the variant is the operation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum OperationPayload {
    Create(Task),
    Update(Task),
    Delete(TaskId),
}

impl OperationPayload {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::Update(_) => OperationKind::Update,
            Self::Delete(_) => OperationKind::Delete,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::Create(task) | Self::Update(task) => &task.id,
            Self::Delete(id) => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutoSaveOperation {
    /// `{type}_{task_id}_{timestamp}`.
    pub id: String,
    /// Unix epoch milliseconds at enqueue time.
    pub timestamp: i64,
    pub payload: OperationPayload,
    pub optimistic: Option<Snapshot>,
    pub rollback: Option<Snapshot>,
}

impl AutoSaveOperation {
    /// Builds an operation stamped with the current time.
    ///
    /// With `with_snapshots`, the optimistic snapshot is `current` with the
    /// payload applied and the rollback snapshot is `current` unchanged.
    pub fn new(payload: OperationPayload, current: &[Task], with_snapshots: bool) -> Self {
        Self::at(now_epoch_ms(), payload, current, with_snapshots)
    }

    pub fn at(
        timestamp: i64,
        payload: OperationPayload,
        current: &[Task],
        with_snapshots: bool,
    ) -> Self {
        let id = format!("{}_{}_{}", payload.kind(), payload.task_id(), timestamp);
        let (optimistic, rollback) = if with_snapshots {
            (
                Some(Snapshot::from(apply_payload(current, &payload))),
                Some(Snapshot::from(current)),
            )
        } else {
            (None, None)
        };
        Self {
            id,
            timestamp,
            payload,
            optimistic,
            rollback,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.payload.kind()
    }

    pub fn task_id(&self) -> &str {
        self.payload.task_id()
    }

    /// Same type, id and payload; snapshots are ignored.
    pub fn is_duplicate_of(&self, other: &AutoSaveOperation) -> bool {
        self.id == other.id && self.payload == other.payload
    }
}

/// Returns a new collection with `payload` applied to `current`.
///
/// Updates and deletes of unknown ids leave the collection unchanged.
pub fn apply_payload(current: &[Task], payload: &OperationPayload) -> Vec<Task> {
    match payload {
        OperationPayload::Create(task) => {
            let mut next = current.to_vec();
            next.push(task.clone());
            next
        }
        OperationPayload::Update(task) => current
            .iter()
            .map(|existing| {
                if existing.id == task.id {
                    task.clone()
                } else {
                    existing.clone()
                }
            })
            .collect(),
        OperationPayload::Delete(id) => current
            .iter()
            .filter(|existing| existing.id != *id)
            .cloned()
            .collect(),
    }
}

pub fn find_task<'a>(tasks: &'a [Task], id: &str) -> Option<&'a Task> {
    tasks.iter().find(|task| task.id == id)
}

pub fn id_set(tasks: &[Task]) -> BTreeSet<&str> {
    tasks.iter().map(|task| task.id.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::{apply_payload, AutoSaveOperation, OperationKind, OperationPayload};
    use crate::model::task::{Priority, Project, Task};

    fn task(id: &str, title: &str) -> Task {
        Task::with_id(id, title, Priority::Medium, Project::Work)
    }

    #[test]
    fn operation_id_encodes_type_task_and_timestamp() {
        let op = AutoSaveOperation::at(
            1_700_000_000_000,
            OperationPayload::Delete("t-1".to_string()),
            &[],
            false,
        );
        assert_eq!(op.id, "delete_t-1_1700000000000");
        assert_eq!(op.kind(), OperationKind::Delete);
        assert!(op.optimistic.is_none() && op.rollback.is_none());
    }

    #[test]
    fn snapshots_capture_before_and_after() {
        let current = vec![task("a", "A"), task("b", "B")];
        let mut renamed = task("b", "B2");
        renamed.updated_at += 1;
        let op = AutoSaveOperation::new(OperationPayload::Update(renamed.clone()), &current, true);

        assert_eq!(op.rollback.as_deref(), Some(current.as_slice()));
        let optimistic = op.optimistic.expect("optimistic snapshot");
        assert_eq!(optimistic[1], renamed);
        assert_eq!(optimistic[0], current[0]);
    }

    #[test]
    fn apply_delete_of_unknown_id_is_noop() {
        let current = vec![task("a", "A")];
        let next = apply_payload(&current, &OperationPayload::Delete("zzz".to_string()));
        assert_eq!(next, current);
    }
}
