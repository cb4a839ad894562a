//! Core domain logic for TaskNest.
//! This crate is the single source of truth for task state and its
//! durability pipeline.

pub mod audit;
pub mod autosave;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod service;
pub mod storage;
pub mod validation;

pub use audit::{LogSecurityEventSink, SecurityEvent, SecurityEventSink, SecurityEventType};
pub use autosave::{
    AutoSaveEngine, AutoSaveError, AutoSaveMetrics, AutoSaveOperation, ClientWins,
    ConflictResolver, EngineOptions, OperationKind, OperationPayload, SaveOutcome, SaveStatus,
    ServerWins, ThreeWayMerge,
};
pub use config::{
    AutoSaveConfig, AutoSaveConfigPatch, ConfigError, CoreConfig, NotificationConfig,
    NotificationConfigPatch,
};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::notification::{
    Notification, NotificationAction, NotificationId, NotificationSource, NotificationType,
};
pub use model::task::{Priority, Project, Task, TaskId, TaskStatus, TaskValidationError};
pub use notify::NotificationCenter;
pub use service::{
    TaskDraft, TaskFilter, TaskPatch, TaskService, TaskServiceDeps, TaskServiceError, TaskStats,
};
pub use storage::{MemoryGateway, PersistenceGateway, SqliteKvGateway, StorageError};
pub use validation::{DefaultTaskValidator, TaskValidator, ValidationError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
