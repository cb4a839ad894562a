//! Domain model for tasks and notifications.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`.
//! - Deletion is a hard removal from the persisted collection.

pub mod notification;
pub mod task;
