//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate validation, in-memory state, auto-save and notifications
//!   into use-case level APIs.
//! - Keep UI layers decoupled from storage details.

pub mod task_service;

pub use task_service::{
    TaskDraft, TaskFilter, TaskPatch, TaskService, TaskServiceDeps, TaskServiceError, TaskStats,
    MSG_TASK_DELETED, MSG_TASK_SAVED, MSG_TASK_UPDATED,
};
