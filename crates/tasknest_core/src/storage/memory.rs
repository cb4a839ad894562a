use super::{PersistenceGateway, StorageResult};
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Process-local gateway backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `key` synchronously.
    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let gateway = Self::new();
        gateway
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
        gateway
    }

    pub fn snapshot(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl PersistenceGateway for MemoryGateway {
    fn get_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<Option<String>>> {
        future::ready(Ok(self.snapshot(key))).boxed()
    }

    fn set_item<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StorageResult<()>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        future::ready(Ok(())).boxed()
    }
}
