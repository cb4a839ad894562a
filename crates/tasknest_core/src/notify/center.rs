//! Bounded notification queue with auto-dismiss timers.
//!
//! # Responsibility
//! - Hold live notifications in insertion order.
//! - Filter success noise from automatic operations.
//! - Push the current list to subscribers after every change.
//!
//! # Invariants
//! - The live list never exceeds `max_notifications`; the oldest entry is
//!   evicted first and its timer is aborted.
//! - Each timed notification owns exactly one timer, aborted on manual
//!   dismissal.
//! - `Auto`-sourced success notifications are never created.

use crate::config::{NotificationConfig, NotificationConfigPatch};
use crate::model::notification::{
    Notification, NotificationAction, NotificationId, NotificationSource, NotificationType,
};
use crate::model::task::now_epoch_ms;
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use uuid::Uuid;

pub type SubscriptionId = u64;

type Listener = Arc<dyn Fn(&[Notification]) + Send + Sync>;

struct CenterState {
    config: NotificationConfig,
    queue: VecDeque<Notification>,
    timers: HashMap<NotificationId, AbortHandle>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: SubscriptionId,
}

impl CenterState {
    fn limit(&self) -> usize {
        self.config.max_notifications.max(1)
    }

    /// Evicts oldest entries until `reserve` more fit under the limit.
    fn evict_overflow(&mut self, reserve: usize) -> usize {
        let mut evicted = 0;
        while !self.queue.is_empty() && self.queue.len() + reserve > self.limit() {
            if let Some(oldest) = self.queue.pop_front() {
                if let Some(timer) = self.timers.remove(&oldest.id) {
                    timer.abort();
                }
                evicted += 1;
            }
        }
        evicted
    }

    fn remove(&mut self, id: NotificationId) -> bool {
        match self.queue.iter().position(|item| item.id == id) {
            Some(index) => {
                self.queue.remove(index);
                true
            }
            None => false,
        }
    }
}

struct Inner {
    state: Mutex<CenterState>,
    runtime: Option<Handle>,
}

/// Cloneable handle; clones share one queue.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl NotificationCenter {
    /// Creates a center; timers run on the tokio runtime current at
    /// construction (or at show time when constructed outside one).
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CenterState {
                    config,
                    queue: VecDeque::new(),
                    timers: HashMap::new(),
                    listeners: Vec::new(),
                    next_subscription: 1,
                }),
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    /// Shows a success message; `Auto` sources are ignored and return `None`.
    pub fn show_success(
        &self,
        message: impl Into<String>,
        source: NotificationSource,
        duration_ms: Option<u64>,
    ) -> Option<NotificationId> {
        if source == NotificationSource::Auto {
            return None;
        }
        let duration = duration_ms.unwrap_or_else(|| self.state().config.success_duration_ms);
        Some(self.push(NotificationType::Success, message.into(), source, Some(duration), None))
    }

    /// Shows a persistent error, optionally with one action.
    pub fn show_error(
        &self,
        message: impl Into<String>,
        action: Option<NotificationAction>,
    ) -> NotificationId {
        self.push(
            NotificationType::Error,
            message.into(),
            NotificationSource::System,
            None,
            action,
        )
    }

    pub fn show_warning(&self, message: impl Into<String>, duration_ms: Option<u64>) -> NotificationId {
        let duration = duration_ms.unwrap_or_else(|| self.state().config.warning_duration_ms);
        self.push(
            NotificationType::Warning,
            message.into(),
            NotificationSource::System,
            Some(duration),
            None,
        )
    }

    pub fn show_info(&self, message: impl Into<String>, duration_ms: Option<u64>) -> NotificationId {
        let duration = duration_ms.unwrap_or_else(|| self.state().config.info_duration_ms);
        self.push(
            NotificationType::Info,
            message.into(),
            NotificationSource::System,
            Some(duration),
            None,
        )
    }

    /// Removes `id` and aborts its timer; unknown ids return `false`.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        let removed = {
            let mut state = self.state();
            if let Some(timer) = state.timers.remove(&id) {
                timer.abort();
            }
            state.remove(id)
        };
        if removed {
            debug!("event=notification_dismiss module=notify status=ok id={id}");
            self.emit();
        }
        removed
    }

    pub fn clear_all(&self) {
        {
            let mut state = self.state();
            for (_, timer) in state.timers.drain() {
                timer.abort();
            }
            state.queue.clear();
        }
        self.emit();
    }

    /// Runs the action attached to `id`, if any.
    pub fn trigger_action(&self, id: NotificationId) -> bool {
        let action = self
            .state()
            .queue
            .iter()
            .find(|item| item.id == id)
            .and_then(|item| item.action.clone());
        match action {
            Some(action) => {
                action.invoke();
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.state().queue.len()
    }

    pub fn by_type(&self, kind: NotificationType) -> Vec<Notification> {
        self.state()
            .queue
            .iter()
            .filter(|item| item.kind == kind)
            .cloned()
            .collect()
    }

    pub fn has_active(&self) -> bool {
        !self.state().queue.is_empty()
    }

    /// Current list, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.state().queue.iter().cloned().collect()
    }

    pub fn config(&self) -> NotificationConfig {
        self.state().config.clone()
    }

    /// Merges `patch`; a lower limit evicts the oldest entries at once.
    pub fn update_config(&self, patch: &NotificationConfigPatch) {
        let evicted = {
            let mut state = self.state();
            patch.apply(&mut state.config);
            state.evict_overflow(0)
        };
        if evicted > 0 {
            self.emit();
        }
    }

    /// Registers `listener`; it receives the full list after every change.
    pub fn subscribe(
        &self,
        listener: impl Fn(&[Notification]) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut state = self.state();
        let id = state.next_subscription;
        state.next_subscription += 1;
        state.listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state();
        let before = state.listeners.len();
        state.listeners.retain(|(listener_id, _)| *listener_id != id);
        state.listeners.len() != before
    }

    fn push(
        &self,
        kind: NotificationType,
        message: String,
        source: NotificationSource,
        duration_ms: Option<u64>,
        action: Option<NotificationAction>,
    ) -> NotificationId {
        let notification = Notification {
            id: Uuid::new_v4(),
            kind,
            message,
            source,
            timestamp: now_epoch_ms(),
            duration_ms,
            action,
        };
        let id = notification.id;

        {
            let mut state = self.state();
            let evicted = state.evict_overflow(1);
            if evicted > 0 {
                debug!("event=notification_evict module=notify status=ok count={evicted}");
            }
            state.queue.push_back(notification);
            if let Some(duration_ms) = duration_ms {
                if let Some(timer) = self.schedule_dismiss(id, Duration::from_millis(duration_ms)) {
                    state.timers.insert(id, timer);
                }
            }
        }

        debug!("event=notification_show module=notify status=ok id={id} type={kind:?} source={source:?}");
        self.emit();
        id
    }

    fn schedule_dismiss(&self, id: NotificationId, after: Duration) -> Option<AbortHandle> {
        let runtime = self
            .inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok());
        let Some(runtime) = runtime else {
            warn!("event=notification_timer module=notify status=error id={id} error_code=no_runtime");
            return None;
        };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = weak.upgrade() {
                NotificationCenter { inner }.expire(id);
            }
        });
        Some(task.abort_handle())
    }

    fn expire(&self, id: NotificationId) {
        let removed = {
            let mut state = self.state();
            state.timers.remove(&id);
            state.remove(id)
        };
        if removed {
            debug!("event=notification_expire module=notify status=ok id={id}");
            self.emit();
        }
    }

    fn emit(&self) {
        let (snapshot, listeners) = {
            let state = self.state();
            let snapshot: Vec<Notification> = state.queue.iter().cloned().collect();
            let listeners: Vec<Listener> = state
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            (snapshot, listeners)
        };
        for listener in listeners {
            listener(&snapshot);
        }
    }

    fn state(&self) -> MutexGuard<'_, CenterState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
    }
}
