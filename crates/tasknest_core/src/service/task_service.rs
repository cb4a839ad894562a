//! Task use-case service.
//!
//! # Responsibility
//! - Be the single entry point for task mutations.
//! - Validate input, update the in-memory collection synchronously and hand
//!   every mutation to the auto-save engine.
//! - Report manual operations through the notification center.
//!
//! # Invariants
//! - Validation failures are returned synchronously and never reach the
//!   auto-save engine.
//! - Asynchronous save failures never surface through these methods; they
//!   are reported by the failure monitor.
//! - `Auto`-sourced operations never produce success notifications.
//! - After a rolled-back save the in-memory collection is reset to the
//!   engine's last-known snapshot.
//! - Mutations are queued while the collection lock is held, so queue order
//!   matches the order in which edits were applied in memory.

use crate::audit::{LogSecurityEventSink, SecurityEvent, SecurityEventSink, SecurityEventType};
use crate::autosave::{AutoSaveEngine, AutoSaveError, EngineOptions, SaveOutcome, SaveStatus};
use crate::config::CoreConfig;
use crate::model::notification::{NotificationAction, NotificationSource};
use crate::model::task::{
    now_epoch_ms, Priority, Project, Task, TaskId, TaskStatus, TaskValidationError,
};
use crate::notify::NotificationCenter;
use crate::storage::{PersistenceGateway, StorageError};
use crate::validation::{DefaultTaskValidator, TaskValidator, ValidationError};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

pub const MSG_TASK_SAVED: &str = "Task saved successfully";
pub const MSG_TASK_UPDATED: &str = "Task updated successfully";
pub const MSG_TASK_DELETED: &str = "Task deleted successfully";

#[derive(Debug)]
pub enum TaskServiceError {
    /// Rejected by the input validator.
    Validation(ValidationError),
    /// Structurally invalid task.
    InvalidTask(TaskValidationError),
    NotFound(TaskId),
    /// Durable state could not be loaded (`open`/`reload` only).
    Storage(StorageError),
    /// Durable state could not be reconciled (`reload` only).
    Sync(AutoSaveError),
}

impl Display for TaskServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidTask(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Sync(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaskServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InvalidTask(err) => Some(err),
            Self::NotFound(_) => None,
            Self::Storage(err) => Some(err),
            Self::Sync(err) => Some(err),
        }
    }
}

impl From<ValidationError> for TaskServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<TaskValidationError> for TaskServiceError {
    fn from(value: TaskValidationError) -> Self {
        Self::InvalidTask(value)
    }
}

impl From<StorageError> for TaskServiceError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<AutoSaveError> for TaskServiceError {
    fn from(value: AutoSaveError) -> Self {
        match value {
            AutoSaveError::Storage(err) => Self::Storage(err),
            other => Self::Sync(other),
        }
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub project: Project,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            priority: Priority::Medium,
            project: Project::Personal,
        }
    }
}

/// Partial edit; `None` keeps the current value.
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub project: Option<Project>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub project: Option<Project>,
    /// Case-insensitive match on title or description.
    pub search: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|status| task.status != status)
            || self.priority.is_some_and(|priority| task.priority != priority)
            || self.project.is_some_and(|project| task.project != project)
        {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                task.title.to_lowercase().contains(&needle)
                    || task
                        .description
                        .as_deref()
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
}

/// Collaborators for [`TaskService::open`].
pub struct TaskServiceDeps {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub config: CoreConfig,
    pub validator: Arc<dyn TaskValidator>,
    pub audit: Arc<dyn SecurityEventSink>,
    pub user_id: Option<String>,
}

impl TaskServiceDeps {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            gateway,
            config: CoreConfig::default(),
            validator: Arc::new(DefaultTaskValidator),
            audit: Arc::new(LogSecurityEventSink),
            user_id: None,
        }
    }
}

pub struct TaskService {
    tasks: Mutex<Vec<Task>>,
    engine: AutoSaveEngine,
    notifications: NotificationCenter,
    validator: Arc<dyn TaskValidator>,
    audit: Arc<dyn SecurityEventSink>,
    user_id: Option<String>,
    rollback_sync: JoinHandle<()>,
}

impl TaskService {
    /// Loads the durable collection and starts the auto-save engine from it.
    ///
    /// # Errors
    /// - `Storage` when the gateway read fails or holds malformed data.
    pub async fn open(deps: TaskServiceDeps) -> Result<Arc<Self>, TaskServiceError> {
        let TaskServiceDeps {
            gateway,
            config,
            validator,
            audit,
            user_id,
        } = deps;

        let tasks = AutoSaveEngine::load_snapshot(gateway.as_ref(), &config.storage_key).await?;
        info!(
            "event=task_service_open module=service status=ok tasks={}",
            tasks.len()
        );

        let engine = AutoSaveEngine::spawn(
            EngineOptions::new(gateway)
                .config(config.autosave.clone())
                .storage_key(config.storage_key.clone())
                .audit(Arc::clone(&audit))
                .initial_snapshot(tasks.clone()),
        );

        let outcomes = engine.subscribe_outcomes();
        Ok(Arc::new_cyclic(|weak| Self {
            tasks: Mutex::new(tasks),
            engine,
            notifications: NotificationCenter::new(config.notifications),
            validator,
            audit,
            user_id,
            rollback_sync: spawn_rollback_sync(outcomes, Weak::clone(weak)),
        }))
    }

    pub fn engine(&self) -> &AutoSaveEngine {
        &self.engine
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn create_task(
        &self,
        draft: TaskDraft,
        source: NotificationSource,
    ) -> Result<Task, TaskServiceError> {
        let result = self.try_create(draft);
        self.finish("create", source, MSG_TASK_SAVED, result)
    }

    pub fn update_task(
        &self,
        id: &str,
        patch: TaskPatch,
        source: NotificationSource,
    ) -> Result<Task, TaskServiceError> {
        let result = self.try_update(id, patch);
        self.finish("update", source, MSG_TASK_UPDATED, result)
    }

    pub fn change_status(
        &self,
        id: &str,
        status: TaskStatus,
        source: NotificationSource,
    ) -> Result<Task, TaskServiceError> {
        let patch = TaskPatch {
            status: Some(status),
            ..TaskPatch::default()
        };
        let result = self.try_update(id, patch);
        self.finish("change_status", source, MSG_TASK_UPDATED, result)
    }

    pub fn delete_task(&self, id: &str, source: NotificationSource) -> Result<Task, TaskServiceError> {
        let result = self.try_delete(id);
        self.finish("delete", source, MSG_TASK_DELETED, result)
    }

    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.tasks().iter().find(|task| task.id == id).cloned()
    }

    /// Filtered tasks ordered by `created_at DESC, id ASC`.
    pub fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let mut items: Vec<Task> = self
            .tasks()
            .iter()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        items
    }

    pub fn stats(&self) -> TaskStats {
        self.tasks()
            .iter()
            .fold(TaskStats::default(), |mut stats, task| {
                stats.total += 1;
                match task.status {
                    TaskStatus::Todo => stats.todo += 1,
                    TaskStatus::InProgress => stats.in_progress += 1,
                    TaskStatus::Done => stats.done += 1,
                }
                stats
            })
    }

    /// Replaces the in-memory collection with durable state.
    pub async fn reload(&self) -> Result<usize, TaskServiceError> {
        let durable = self.engine.force_sync().await?;
        let count = durable.len();
        *self.tasks() = durable;
        info!("event=task_service_reload module=service status=ok tasks={count}");
        Ok(count)
    }

    /// Posts a persistent error notification for every failed save.
    ///
    /// The notification offers a "Reload" action that resynchronizes the
    /// in-memory collection with durable state; it runs on the monitor's
    /// runtime when invoked from a thread outside any runtime. The monitor
    /// stops when the service is dropped.
    pub fn spawn_failure_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let mut outcomes = self.engine.subscribe_outcomes();
        let weak: Weak<Self> = Arc::downgrade(self);
        let monitor_runtime = Handle::try_current().ok();
        tokio::spawn(async move {
            loop {
                let outcome = match outcomes.recv().await {
                    Ok(outcome) => outcome,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("event=failure_monitor module=service status=warn lagged={skipped}");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(failure) = outcome.failure() else {
                    continue;
                };
                let Some(service) = weak.upgrade() else {
                    break;
                };
                let reload_target = Weak::clone(&weak);
                let fallback_runtime = monitor_runtime.clone();
                let action = NotificationAction::new("Reload", move || {
                    let Some(service) = reload_target.upgrade() else {
                        return;
                    };
                    // Actions may fire from threads outside the runtime.
                    let runtime = Handle::try_current().ok().or_else(|| fallback_runtime.clone());
                    let Some(runtime) = runtime else {
                        error!("event=task_service_reload module=service status=error error_code=no_runtime");
                        return;
                    };
                    runtime.spawn(async move {
                        if let Err(err) = service.reload().await {
                            error!("event=task_service_reload module=service status=error error={err}");
                        }
                    });
                });
                service.notifications.show_error(
                    format!("Failed to save changes: {failure}"),
                    Some(action),
                );
            }
        })
    }

    fn try_create(&self, draft: TaskDraft) -> Result<Task, TaskServiceError> {
        self.validator.validate_title(&draft.title)?;
        if let Some(description) = &draft.description {
            self.validator.validate_description(description)?;
        }

        let mut task = Task::new(draft.title.trim(), draft.priority, draft.project);
        task.description = draft.description;
        task.validate()?;

        let mut tasks = self.tasks();
        let previous = tasks.clone();
        tasks.push(task.clone());
        self.engine.queue_create(task.clone(), &previous);
        Ok(task)
    }

    fn try_update(&self, id: &str, patch: TaskPatch) -> Result<Task, TaskServiceError> {
        if let Some(title) = &patch.title {
            self.validator.validate_title(title)?;
        }
        if let Some(Some(description)) = &patch.description {
            self.validator.validate_description(description)?;
        }

        let mut tasks = self.tasks();
        let index = tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| TaskServiceError::NotFound(id.to_string()))?;

        let mut updated = tasks[index].clone();
        if let Some(title) = patch.title {
            updated.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            updated.description = description;
        }
        if let Some(priority) = patch.priority {
            updated.priority = priority;
        }
        if let Some(status) = patch.status {
            updated.status = status;
        }
        if let Some(project) = patch.project {
            updated.project = project;
        }
        updated.touch(now_epoch_ms());
        updated.validate()?;

        let previous = tasks.clone();
        tasks[index] = updated.clone();
        self.engine.queue_update(updated.clone(), &previous);
        Ok(updated)
    }

    fn try_delete(&self, id: &str) -> Result<Task, TaskServiceError> {
        let mut tasks = self.tasks();
        let index = tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| TaskServiceError::NotFound(id.to_string()))?;

        let previous = tasks.clone();
        let removed = tasks.remove(index);
        self.engine.queue_delete(removed.id.clone(), &previous);
        Ok(removed)
    }

    fn finish(
        &self,
        operation: &'static str,
        source: NotificationSource,
        success_message: &'static str,
        result: Result<Task, TaskServiceError>,
    ) -> Result<Task, TaskServiceError> {
        match &result {
            Ok(task) => {
                info!(
                    "event=task_{operation} module=service status=ok task_id={} source={source:?}",
                    task.id
                );
                self.audit.log_security_event(SecurityEvent::new(
                    SecurityEventType::TaskOperationCompleted,
                    format!("{operation} task {}", task.id),
                    self.user_id.clone(),
                ));
                if source == NotificationSource::Manual {
                    self.notifications
                        .show_success(success_message, source, None);
                }
            }
            Err(err) => {
                warn!("event=task_{operation} module=service status=error source={source:?} error={err}");
                self.audit.log_security_event(SecurityEvent::new(
                    SecurityEventType::TaskOperationFailed,
                    format!("{operation} failed: {err}"),
                    self.user_id.clone(),
                ));
                if source == NotificationSource::Manual {
                    self.notifications.show_error(err.to_string(), None);
                }
            }
        }
        result
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sync_after_rollback(&self, outcome: &SaveOutcome) {
        // The engine lock is released before `tasks` is taken.
        let restored = self.engine.last_known_snapshot();
        let count = restored.len();
        *self.tasks() = restored;
        warn!(
            "event=task_service_rollback_sync module=service status=ok op_id={} task_id={} tasks={count}",
            outcome.operation_id, outcome.task_id
        );
    }
}

impl Drop for TaskService {
    fn drop(&mut self) {
        self.rollback_sync.abort();
    }
}

/// Resets the service collection whenever the engine reports a rollback.
fn spawn_rollback_sync(
    mut outcomes: broadcast::Receiver<SaveOutcome>,
    service: Weak<TaskService>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let outcome = match outcomes.recv().await {
                Ok(outcome) => outcome,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("event=task_service_rollback_sync module=service status=warn lagged={skipped}");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !matches!(outcome.status, SaveStatus::Failed { rolled_back: true, .. }) {
                continue;
            }
            let Some(service) = service.upgrade() else {
                break;
            };
            service.sync_after_rollback(&outcome);
        }
    })
}
