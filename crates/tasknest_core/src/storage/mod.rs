//! Key/value persistence gateway.
//!
//! # Responsibility
//! - Define the async, fallible key/value contract the auto-save engine
//!   persists through.
//! - Provide in-memory and SQLite implementations.
//!
//! # Invariants
//! - Every failure is reported as `StorageError`; callers treat all of
//!   them as retryable.

mod memory;
mod sqlite;

pub use memory::MemoryGateway;
pub use sqlite::SqliteKvGateway;

use crate::db::DbError;
use futures::future::BoxFuture;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug)]
pub enum StorageError {
    Db(DbError),
    /// Backend temporarily unable to serve the request.
    Unavailable(String),
    Serialization(serde_json::Error),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "storage database error: {err}"),
            Self::Unavailable(message) => write!(f, "storage unavailable: {message}"),
            Self::Serialization(err) => write!(f, "storage serialization error: {err}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Unavailable(_) => None,
            Self::Serialization(err) => Some(err),
        }
    }
}

impl From<DbError> for StorageError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Async key/value store.
pub trait PersistenceGateway: Send + Sync {
    /// Reads `key`; `Ok(None)` when nothing was stored yet.
    fn get_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<Option<String>>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_item<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StorageResult<()>>;
}
