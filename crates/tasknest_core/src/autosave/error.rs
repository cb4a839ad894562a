use crate::model::task::TaskId;
use crate::storage::StorageError;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum AutoSaveError {
    /// Create for an id that already exists.
    DuplicateTask(TaskId),
    /// Update/delete target missing from the base snapshot.
    TaskNotFound(TaskId),
    Storage(StorageError),
    Serialization(serde_json::Error),
}

impl AutoSaveError {
    /// Only storage failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::DuplicateTask(_) | Self::TaskNotFound(_) => FailureKind::Validation,
            Self::Storage(_) | Self::Serialization(_) => FailureKind::Persistence,
        }
    }
}

impl Display for AutoSaveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateTask(id) => write!(f, "task already exists: {id}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "failed to serialize tasks: {err}"),
        }
    }
}

impl Error for AutoSaveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::DuplicateTask(_) | Self::TaskNotFound(_) => None,
        }
    }
}

impl From<StorageError> for AutoSaveError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Validation,
    Persistence,
}

/// Cloneable failure summary delivered on the outcome channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&AutoSaveError> for SaveFailure {
    fn from(value: &AutoSaveError) -> Self {
        Self {
            kind: value.failure_kind(),
            message: value.to_string(),
        }
    }
}

impl Display for SaveFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
