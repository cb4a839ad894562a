//! User-facing notification model.
//!
//! # Invariants
//! - `duration_ms == None` marks a persistent notification.
//! - Success notifications never carry `NotificationSource::Auto`.

use serde::Serialize;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use uuid::Uuid;

pub type NotificationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Success,
    Error,
    Warning,
    Info,
}

/// Origin of the operation a notification reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSource {
    /// User-initiated action.
    Manual,
    /// Background/automatic action.
    Auto,
    System,
}

/// Zero-argument callback attached to a notification.
pub type ActionHandler = Arc<dyn Fn() + Send + Sync>;

/// Single action button (for example "Retry") on a notification.
#[derive(Clone)]
pub struct NotificationAction {
    pub label: String,
    handler: ActionHandler,
}

impl NotificationAction {
    pub fn new(label: impl Into<String>, handler: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            handler: Arc::new(handler),
        }
    }

    /// Runs the attached handler.
    pub fn invoke(&self) {
        (self.handler)();
    }
}

impl Debug for NotificationAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    pub source: NotificationSource,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    pub duration_ms: Option<u64>,
    #[serde(skip)]
    pub action: Option<NotificationAction>,
}

impl Notification {
    pub fn is_persistent(&self) -> bool {
        self.duration_ms.is_none()
    }
}
