#![allow(dead_code)]

use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tasknest_core::storage::StorageResult;
use tasknest_core::{
    AutoSaveConfig, AutoSaveEngine, EngineOptions, MemoryGateway, PersistenceGateway, Priority,
    Project, SaveOutcome, SecurityEvent, SecurityEventSink, StorageError, Task,
};
use tokio::sync::broadcast::Receiver;

pub const KEY: &str = "tasks";

/// Memory gateway with failure injection, write counting and an optional
/// artificial write latency.
#[derive(Default)]
pub struct FlakyGateway {
    inner: MemoryGateway,
    fail_next_writes: AtomicUsize,
    always_fail: AtomicBool,
    attempts: AtomicUsize,
    writes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    write_delay: Duration,
}

impl FlakyGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(write_delay: Duration) -> Self {
        Self {
            write_delay,
            ..Self::default()
        }
    }

    pub fn seeded(tasks: &[Task]) -> Self {
        Self {
            inner: MemoryGateway::with_entry(KEY, serde_json::to_string(tasks).unwrap()),
            ..Self::default()
        }
    }

    pub fn fail_next(&self, count: usize) {
        self.fail_next_writes.store(count, Ordering::SeqCst);
    }

    pub fn fail_always(&self, enabled: bool) {
        self.always_fail.store(enabled, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Vec<Task> {
        self.inner
            .snapshot(KEY)
            .map(|raw| serde_json::from_str(&raw).unwrap())
            .unwrap_or_default()
    }

    fn should_fail(&self) -> bool {
        if self.always_fail.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl PersistenceGateway for FlakyGateway {
    fn get_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<Option<String>>> {
        self.inner.get_item(key)
    }

    fn set_item<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StorageResult<()>> {
        async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);
            if !self.write_delay.is_zero() {
                tokio::time::sleep(self.write_delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.should_fail() {
                return Err(StorageError::Unavailable("injected failure".to_string()));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set_item(key, value).await
        }
        .boxed()
    }
}

#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SecurityEventSink for RecordingAuditSink {
    fn log_security_event(&self, event: SecurityEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn task(id: &str, title: &str, updated_at: i64) -> Task {
    let mut task = Task::with_id(id, title, Priority::Medium, Project::Work);
    task.created_at = 1_000;
    task.updated_at = updated_at;
    task
}

pub fn retitled(task: &Task, title: &str, updated_at: i64) -> Task {
    Task {
        title: title.to_string(),
        updated_at,
        ..task.clone()
    }
}

pub fn fast_config() -> AutoSaveConfig {
    AutoSaveConfig {
        debounce_ms: 100,
        max_retries: 2,
        retry_delay_ms: 50,
        ..AutoSaveConfig::default()
    }
}

pub fn spawn_engine(
    gateway: Arc<FlakyGateway>,
    config: AutoSaveConfig,
    initial: Vec<Task>,
) -> AutoSaveEngine {
    AutoSaveEngine::spawn(
        EngineOptions::new(gateway)
            .config(config)
            .storage_key(KEY)
            .initial_snapshot(initial),
    )
}

/// Waits for the next outcome that touched storage.
pub async fn settle(outcomes: &mut Receiver<SaveOutcome>) -> SaveOutcome {
    loop {
        let outcome = outcomes.recv().await.expect("outcome channel open");
        if outcome.is_settled() {
            return outcome;
        }
    }
}

pub fn titles(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|task| task.title.as_str()).collect()
}
