//! Debounced, single-flight auto-save worker.
//!
//! # Responsibility
//! - Turn queued task mutations into whole-collection writes through the
//!   persistence gateway.
//! - Keep the last-known durable snapshot, retry transient failures and roll
//!   back terminal ones.
//!
//! # Invariants
//! - One worker task processes operations; at most one write is in flight.
//! - The last-known snapshot and pending table are mutated only by the
//!   worker (callers enqueue and inspect).
//! - Every processed operation leaves the pending table exactly once.
//! - The worker never panics on operation failures; outcomes go to metrics,
//!   logs and the outcome channel.

use super::conflict::{ClientWins, ConflictContext, ConflictResolver};
use super::error::{AutoSaveError, SaveFailure};
use super::metrics::AutoSaveMetrics;
use super::operation::{
    apply_payload, find_task, id_set, AutoSaveOperation, OperationKind, OperationPayload, Snapshot,
};
use crate::audit::{LogSecurityEventSink, SecurityEvent, SecurityEventSink, SecurityEventType};
use crate::config::{AutoSaveConfig, AutoSaveConfigPatch, DEFAULT_STORAGE_KEY};
use crate::model::task::{now_epoch_ms, Task, TaskId};
use crate::storage::{PersistenceGateway, StorageError, StorageResult};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const OUTCOME_CHANNEL_CAPACITY: usize = 64;

/// Final status of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveStatus {
    Saved { tasks: usize, attempts: u32 },
    Failed { failure: SaveFailure, rolled_back: bool },
    /// Replaced by a later operation inside the debounce window.
    Superseded { by: String },
    /// Identical to the operation received right before it.
    Deduplicated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub operation_id: String,
    pub kind: OperationKind,
    pub task_id: TaskId,
    pub status: SaveStatus,
    pub duration_ms: u64,
}

impl SaveOutcome {
    /// True for `Saved` and `Failed`, the outcomes that touched storage.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            SaveStatus::Saved { .. } | SaveStatus::Failed { .. }
        )
    }

    pub fn failure(&self) -> Option<&SaveFailure> {
        match &self.status {
            SaveStatus::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

/// Construction parameters for [`AutoSaveEngine::spawn`].
pub struct EngineOptions {
    gateway: Arc<dyn PersistenceGateway>,
    audit: Arc<dyn SecurityEventSink>,
    config: AutoSaveConfig,
    storage_key: String,
    initial_snapshot: Vec<Task>,
}

impl EngineOptions {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            gateway,
            audit: Arc::new(LogSecurityEventSink),
            config: AutoSaveConfig::default(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            initial_snapshot: Vec::new(),
        }
    }

    pub fn config(mut self, config: AutoSaveConfig) -> Self {
        self.config = config;
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn audit(mut self, audit: Arc<dyn SecurityEventSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Durable collection the engine starts from.
    pub fn initial_snapshot(mut self, tasks: Vec<Task>) -> Self {
        self.initial_snapshot = tasks;
        self
    }
}

struct EngineState {
    config: AutoSaveConfig,
    metrics: AutoSaveMetrics,
    pending: HashMap<String, AutoSaveOperation>,
    last_known: Snapshot,
    resolvers: HashMap<OperationKind, Arc<dyn ConflictResolver>>,
}

struct Shared {
    gateway: Arc<dyn PersistenceGateway>,
    audit: Arc<dyn SecurityEventSink>,
    storage_key: String,
    state: Mutex<EngineState>,
    saving: AtomicBool,
    outcomes: broadcast::Sender<SaveOutcome>,
}

/// Handle to the auto-save worker. Dropping it stops the worker.
pub struct AutoSaveEngine {
    shared: Arc<Shared>,
    sender: mpsc::UnboundedSender<AutoSaveOperation>,
    worker: JoinHandle<()>,
}

impl AutoSaveEngine {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(options: EngineOptions) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            gateway: options.gateway,
            audit: options.audit,
            storage_key: options.storage_key,
            state: Mutex::new(EngineState {
                config: options.config,
                metrics: AutoSaveMetrics::default(),
                pending: HashMap::new(),
                last_known: Snapshot::from(options.initial_snapshot),
                resolvers: HashMap::new(),
            }),
            saving: AtomicBool::new(false),
            outcomes,
        });
        let worker = tokio::spawn(run_worker(Arc::clone(&shared), receiver));
        info!(
            "event=autosave_start module=autosave status=ok key={}",
            shared.storage_key
        );
        Self {
            shared,
            sender,
            worker,
        }
    }

    /// Reads the durable collection stored under `key`.
    pub async fn load_snapshot(
        gateway: &dyn PersistenceGateway,
        key: &str,
    ) -> StorageResult<Vec<Task>> {
        match gateway.get_item(key).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(StorageError::from),
            None => Ok(Vec::new()),
        }
    }

    pub fn queue_create(&self, task: Task, current: &[Task]) -> String {
        self.enqueue(OperationPayload::Create(task), current)
    }

    pub fn queue_update(&self, task: Task, current: &[Task]) -> String {
        self.enqueue(OperationPayload::Update(task), current)
    }

    pub fn queue_delete(&self, task_id: impl Into<TaskId>, current: &[Task]) -> String {
        self.enqueue(OperationPayload::Delete(task_id.into()), current)
    }

    /// Registers and sends a prebuilt operation; returns its id.
    pub fn submit(&self, operation: AutoSaveOperation) -> String {
        let id = operation.id.clone();
        debug!(
            "event=autosave_queue module=autosave status=ok op_id={} type={} task_id={}",
            id,
            operation.kind(),
            operation.task_id()
        );
        self.shared
            .state()
            .pending
            .insert(id.clone(), operation.clone());
        if self.sender.send(operation).is_err() {
            warn!("event=autosave_queue module=autosave status=error op_id={id} error_code=worker_stopped");
            self.shared.state().pending.remove(&id);
        }
        id
    }

    /// Reads durable state directly, bypassing the queue.
    pub async fn force_sync(&self) -> Result<Vec<Task>, AutoSaveError> {
        let tasks =
            Self::load_snapshot(self.shared.gateway.as_ref(), &self.shared.storage_key).await?;
        info!(
            "event=autosave_force_sync module=autosave status=ok tasks={}",
            tasks.len()
        );
        Ok(tasks)
    }

    pub fn metrics(&self) -> AutoSaveMetrics {
        self.shared.state().metrics.clone()
    }

    pub fn reset_metrics(&self) {
        self.shared.state().metrics = AutoSaveMetrics::default();
    }

    /// Pending operations ordered by enqueue time.
    pub fn pending_operations(&self) -> Vec<AutoSaveOperation> {
        let mut pending: Vec<AutoSaveOperation> =
            self.shared.state().pending.values().cloned().collect();
        pending.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        pending
    }

    pub fn is_operation_pending(&self, operation_id: &str) -> bool {
        self.shared.state().pending.contains_key(operation_id)
    }

    /// Drops bookkeeping for `operation_id`; an operation already being
    /// processed still runs to completion.
    pub fn cancel_pending_operation(&self, operation_id: &str) -> bool {
        self.shared.state().pending.remove(operation_id).is_some()
    }

    pub fn clear_pending_operations(&self) {
        self.shared.state().pending.clear();
    }

    pub fn set_conflict_resolution(&self, kind: OperationKind, resolver: Arc<dyn ConflictResolver>) {
        info!(
            "event=autosave_resolver module=autosave status=ok type={} resolver={}",
            kind,
            resolver.name()
        );
        self.shared.state().resolvers.insert(kind, resolver);
    }

    pub fn update_config(&self, patch: &AutoSaveConfigPatch) {
        let mut state = self.shared.state();
        patch.apply(&mut state.config);
        debug!("event=autosave_config module=autosave status=ok config={:?}", state.config);
    }

    pub fn config(&self) -> AutoSaveConfig {
        self.shared.state().config.clone()
    }

    pub fn last_known_snapshot(&self) -> Vec<Task> {
        self.shared.state().last_known.to_vec()
    }

    /// True while the worker is persisting (including retries and rollback).
    pub fn is_saving(&self) -> bool {
        self.shared.saving.load(Ordering::SeqCst)
    }

    /// One `SaveOutcome` per operation received after subscribing.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<SaveOutcome> {
        self.shared.outcomes.subscribe()
    }

    /// Stops the worker; queued operations that have not started are dropped.
    pub fn shutdown(&self) {
        self.worker.abort();
    }

    fn enqueue(&self, payload: OperationPayload, current: &[Task]) -> String {
        let with_snapshots = self.shared.state().config.enable_optimistic_updates;
        self.submit(AutoSaveOperation::new(payload, current, with_snapshots))
    }
}

impl Drop for AutoSaveEngine {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(shared: Arc<Shared>, mut receiver: mpsc::UnboundedReceiver<AutoSaveOperation>) {
    let mut previous: Option<AutoSaveOperation> = None;

    while let Some(first) = next_distinct(&shared, &mut receiver, &mut previous).await {
        let mut latest = first;
        let mut closed = false;
        loop {
            let debounce = shared.state().config.debounce();
            match tokio::time::timeout(
                debounce,
                next_distinct(&shared, &mut receiver, &mut previous),
            )
            .await
            {
                Ok(Some(next)) => {
                    shared.discard(&latest, SaveStatus::Superseded {
                        by: next.id.clone(),
                    });
                    latest = next;
                }
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }
        shared.process(latest).await;
        if closed {
            break;
        }
    }
    debug!("event=autosave_stop module=autosave status=ok");
}

/// Receives the next operation that is not a duplicate of the one before it.
async fn next_distinct(
    shared: &Shared,
    receiver: &mut mpsc::UnboundedReceiver<AutoSaveOperation>,
    previous: &mut Option<AutoSaveOperation>,
) -> Option<AutoSaveOperation> {
    loop {
        let operation = receiver.recv().await?;
        let duplicate = previous
            .as_ref()
            .is_some_and(|prev| operation.is_duplicate_of(prev));
        if duplicate {
            shared.discard(&operation, SaveStatus::Deduplicated);
            continue;
        }
        *previous = Some(operation.clone());
        return Some(operation);
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, outcome: SaveOutcome) {
        // No receivers is fine.
        let _ = self.outcomes.send(outcome);
    }

    fn discard(&self, operation: &AutoSaveOperation, status: SaveStatus) {
        self.state().pending.remove(&operation.id);
        debug!(
            "event=autosave_discard module=autosave status=ok op_id={} reason={:?}",
            operation.id, status
        );
        self.publish(SaveOutcome {
            operation_id: operation.id.clone(),
            kind: operation.kind(),
            task_id: operation.task_id().to_string(),
            status,
            duration_ms: 0,
        });
    }

    async fn process(&self, operation: AutoSaveOperation) {
        self.saving.store(true, Ordering::SeqCst);
        self.state().metrics.record_started();
        let started_at = Instant::now();

        let result = self.execute(&operation).await;
        let elapsed = started_at.elapsed();
        let duration_ms = elapsed.as_secs_f64() * 1000.0;

        let status = match result {
            Ok((persisted, attempts)) => {
                self.record_success(&operation, persisted, attempts, duration_ms)
            }
            Err(err) => {
                {
                    self.state().metrics.record_failure(duration_ms);
                }
                error!(
                    "event=autosave_persist module=autosave status=error op_id={} type={} duration_ms={} retryable={} error={}",
                    operation.id,
                    operation.kind(),
                    elapsed.as_millis(),
                    err.is_retryable(),
                    err
                );
                let rolled_back = self.rollback(&operation).await;
                SaveStatus::Failed {
                    failure: SaveFailure::from(&err),
                    rolled_back,
                }
            }
        };

        self.state().pending.remove(&operation.id);
        self.saving.store(false, Ordering::SeqCst);
        self.publish(SaveOutcome {
            operation_id: operation.id.clone(),
            kind: operation.kind(),
            task_id: operation.task_id().to_string(),
            status,
            duration_ms: elapsed.as_millis() as u64,
        });
    }

    fn record_success(
        &self,
        operation: &AutoSaveOperation,
        persisted: Vec<Task>,
        attempts: u32,
        duration_ms: f64,
    ) -> SaveStatus {
        let task_count = persisted.len();
        let mut state = self.state();
        if let Some(optimistic) = &operation.optimistic {
            if id_set(optimistic) != id_set(&persisted) {
                state.metrics.record_conflict();
                warn!(
                    "event=autosave_id_mismatch module=autosave status=warn op_id={} optimistic={} persisted={}",
                    operation.id,
                    optimistic.len(),
                    task_count
                );
            }
        }
        state.last_known = Snapshot::from(persisted);
        state.metrics.record_success(duration_ms, now_epoch_ms());
        drop(state);

        info!(
            "event=autosave_persist module=autosave status=ok op_id={} type={} tasks={} attempts={} duration_ms={:.0}",
            operation.id,
            operation.kind(),
            task_count,
            attempts,
            duration_ms
        );
        SaveStatus::Saved {
            tasks: task_count,
            attempts,
        }
    }

    /// Computes the target collection and persists it.
    ///
    /// Returns the persisted collection and the number of attempts used.
    async fn execute(
        &self,
        operation: &AutoSaveOperation,
    ) -> Result<(Vec<Task>, u32), AutoSaveError> {
        let (config, last_known) = {
            let state = self.state();
            (state.config.clone(), Arc::clone(&state.last_known))
        };

        let target = match &operation.payload {
            OperationPayload::Create(task) => {
                let in_rollback = operation
                    .rollback
                    .as_deref()
                    .is_some_and(|tasks| find_task(tasks, &task.id).is_some());
                if in_rollback || find_task(&last_known, &task.id).is_some() {
                    return Err(AutoSaveError::DuplicateTask(task.id.clone()));
                }
                match &operation.optimistic {
                    Some(optimistic) => optimistic.to_vec(),
                    None => apply_payload(&last_known, &operation.payload),
                }
            }
            OperationPayload::Update(task) => {
                let in_rollback = operation
                    .rollback
                    .as_deref()
                    .is_some_and(|tasks| find_task(tasks, &task.id).is_some());
                if !in_rollback && find_task(&last_known, &task.id).is_none() {
                    return Err(AutoSaveError::TaskNotFound(task.id.clone()));
                }
                let stale = find_task(&last_known, &task.id)
                    .is_some_and(|stored| stored.updated_at > task.updated_at);
                if stale {
                    self.resolve_conflict(operation, task, last_known).await
                } else if let Some(optimistic) = &operation.optimistic {
                    optimistic.to_vec()
                } else {
                    apply_payload(&last_known, &operation.payload)
                }
            }
            OperationPayload::Delete(task_id) => {
                let base = operation.rollback.as_ref().unwrap_or(&last_known);
                if find_task(base, task_id).is_none() {
                    return Err(AutoSaveError::TaskNotFound(task_id.clone()));
                }
                match &operation.optimistic {
                    Some(optimistic) => optimistic.to_vec(),
                    None => apply_payload(&last_known, &operation.payload),
                }
            }
        };

        let serialized = serde_json::to_string(&target).map_err(AutoSaveError::Serialization)?;
        let attempts = self.persist_with_retry(operation, serialized, &config).await?;
        Ok((target, attempts))
    }

    async fn resolve_conflict(
        &self,
        operation: &AutoSaveOperation,
        incoming: &Task,
        server: Snapshot,
    ) -> Vec<Task> {
        let resolver = {
            let mut state = self.state();
            state.metrics.record_conflict();
            state
                .resolvers
                .get(&OperationKind::Update)
                .cloned()
                .unwrap_or_else(|| Arc::new(ClientWins))
        };
        warn!(
            "event=autosave_conflict module=autosave status=warn op_id={} task_id={} resolver={}",
            operation.id,
            incoming.id,
            resolver.name()
        );
        let base = operation
            .rollback
            .as_deref()
            .and_then(|tasks| find_task(tasks, &incoming.id))
            .cloned();
        resolver
            .resolve(ConflictContext {
                incoming: incoming.clone(),
                base,
                server,
            })
            .await
    }

    async fn persist_with_retry(
        &self,
        operation: &AutoSaveOperation,
        serialized: String,
        config: &AutoSaveConfig,
    ) -> Result<u32, AutoSaveError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self
                .gateway
                .set_item(&self.storage_key, serialized.clone())
                .await
            {
                Ok(()) => return Ok(attempt),
                Err(err) if attempt > config.max_retries => return Err(err.into()),
                Err(err) => {
                    let backoff = config.retry_backoff(attempt);
                    warn!(
                        "event=autosave_retry module=autosave status=warn op_id={} attempt={} backoff_ms={} error={}",
                        operation.id,
                        attempt,
                        backoff.as_millis(),
                        err
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Restores the pre-operation snapshot; returns whether a rollback ran.
    async fn rollback(&self, operation: &AutoSaveOperation) -> bool {
        let enabled = self.state().config.rollback_enabled();
        let Some(rollback) = operation.rollback.as_ref().filter(|_| enabled) else {
            return false;
        };

        match serde_json::to_string(&**rollback) {
            Ok(serialized) => {
                if let Err(err) = self.gateway.set_item(&self.storage_key, serialized).await {
                    error!(
                        "event=autosave_rollback module=autosave status=error op_id={} error={}",
                        operation.id, err
                    );
                }
            }
            Err(err) => error!(
                "event=autosave_rollback module=autosave status=error op_id={} error_code=serialize_failed error={}",
                operation.id, err
            ),
        }

        {
            let mut state = self.state();
            state.last_known = Arc::clone(rollback);
            state.metrics.record_rollback();
        }
        warn!(
            "event=autosave_rollback module=autosave status=ok op_id={} tasks={}",
            operation.id,
            rollback.len()
        );
        self.audit.log_security_event(SecurityEvent::new(
            SecurityEventType::AutoSaveRollback,
            format!(
                "rolled back {} of task {} ({})",
                operation.kind(),
                operation.task_id(),
                operation.id
            ),
            None,
        ));
        true
    }
}
