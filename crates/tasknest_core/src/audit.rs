//! Security/audit event sink.
//!
//! Fire-and-forget: sinks never report failures back to callers.

use crate::model::task::now_epoch_ms;
use log::{info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    TaskOperationCompleted,
    TaskOperationFailed,
    AutoSaveRollback,
}

impl SecurityEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskOperationCompleted => "task_operation_completed",
            Self::TaskOperationFailed => "task_operation_failed",
            Self::AutoSaveRollback => "autosave_rollback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    #[serde(rename = "type")]
    pub kind: SecurityEventType,
    pub message: String,
    pub timestamp: i64,
    pub user_id: Option<String>,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventType, message: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: now_epoch_ms(),
            user_id,
        }
    }
}

pub trait SecurityEventSink: Send + Sync {
    fn log_security_event(&self, event: SecurityEvent);
}

/// Sink writing events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSecurityEventSink;

impl SecurityEventSink for LogSecurityEventSink {
    fn log_security_event(&self, event: SecurityEvent) {
        let user = event.user_id.as_deref().unwrap_or("anonymous");
        match event.kind {
            SecurityEventType::TaskOperationCompleted => info!(
                "event=security_event module=audit type={} user={} ts={} message={}",
                event.kind.as_str(),
                user,
                event.timestamp,
                event.message
            ),
            SecurityEventType::TaskOperationFailed | SecurityEventType::AutoSaveRollback => warn!(
                "event=security_event module=audit type={} user={} ts={} message={}",
                event.kind.as_str(),
                user,
                event.timestamp,
                event.message
            ),
        }
    }
}
