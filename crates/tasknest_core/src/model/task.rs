//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical task record owned by the domain service.
//! - Provide structural validation shared by service and persistence paths.
//!
//! # Invariants
//! - `id` is stable and never reused for another task.
//! - `updated_at` never moves backwards for one task.
//! - `updated_at >= created_at`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable task identifier (UUID v4 text for locally created tasks).
pub type TaskId = String;

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created but not started.
    Todo,
    /// Work is in progress.
    InProgress,
    /// Completed.
    Done,
}

/// Fixed set of projects a task can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Project {
    Personal,
    Work,
    Shopping,
    Health,
    Learning,
}

impl Project {
    pub const ALL: [Project; 5] = [
        Project::Personal,
        Project::Work,
        Project::Shopping,
        Project::Health,
        Project::Learning,
    ];
}

/// Canonical task record.
///
/// Serialized with camelCase keys; the whole collection is persisted as one
/// JSON array by the auto-save engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub project: Project,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

/// Structural validation errors for [`Task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    EmptyId,
    EmptyTitle,
    UpdatedBeforeCreated { created_at: i64, updated_at: i64 },
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "task id cannot be empty"),
            Self::EmptyTitle => write!(f, "task title cannot be empty"),
            Self::UpdatedBeforeCreated {
                created_at,
                updated_at,
            } => write!(
                f,
                "task updated_at ({updated_at}) cannot be earlier than created_at ({created_at})"
            ),
        }
    }
}

impl Error for TaskValidationError {}

impl Task {
    /// Creates a new `Todo` task with a generated id and current timestamps.
    pub fn new(title: impl Into<String>, priority: Priority, project: Project) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), title, priority, project)
    }

    /// Creates a new `Todo` task with a caller-provided id.
    ///
    /// Used by import paths and tests where identity already exists.
    pub fn with_id(
        id: impl Into<TaskId>,
        title: impl Into<String>,
        priority: Priority,
        project: Project,
    ) -> Self {
        let now = now_epoch_ms();
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            priority,
            status: TaskStatus::Todo,
            project,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validates structural invariants.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.id.trim().is_empty() {
            return Err(TaskValidationError::EmptyId);
        }
        if self.title.trim().is_empty() {
            return Err(TaskValidationError::EmptyTitle);
        }
        if self.updated_at < self.created_at {
            return Err(TaskValidationError::UpdatedBeforeCreated {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        Ok(())
    }

    /// Advances `updated_at` to `now` without ever moving it backwards.
    pub fn touch(&mut self, now: i64) {
        self.updated_at = self.updated_at.max(now);
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}

/// Current wall clock in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{Priority, Project, Task, TaskStatus, TaskValidationError};

    #[test]
    fn new_task_starts_as_todo_with_equal_timestamps() {
        let task = Task::new("write report", Priority::High, Project::Work);
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.created_at, task.updated_at);
        assert!(task.validate().is_ok());
    }

    #[test]
    fn touch_never_moves_updated_at_backwards() {
        let mut task = Task::with_id("t-1", "a", Priority::Low, Project::Personal);
        let before = task.updated_at;
        task.touch(before - 10_000);
        assert_eq!(task.updated_at, before);
        task.touch(before + 5);
        assert_eq!(task.updated_at, before + 5);
    }

    #[test]
    fn validate_rejects_blank_title_and_inverted_timestamps() {
        let mut task = Task::with_id("t-2", "   ", Priority::Low, Project::Personal);
        assert_eq!(task.validate(), Err(TaskValidationError::EmptyTitle));

        task.title = "ok".to_string();
        task.updated_at = task.created_at - 1;
        assert!(matches!(
            task.validate(),
            Err(TaskValidationError::UpdatedBeforeCreated { .. })
        ));
    }
}
