use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Device-local key-value store addressed by named slots.
///
/// Values are whole documents: `set` overwrites, there is no append.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Read a slot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read. A missing slot is `Ok(None)`.
    async fn get(&self, slot: &str) -> Result<Option<String>, StorageError>;

    /// Overwrite a slot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn set(&self, slot: &str, value: &str) -> Result<(), StorageError>;

    /// Erase a slot. Removing a missing slot succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn remove(&self, slot: &str) -> Result<(), StorageError>;
}

/// Simple in-memory store for testing and prototyping.
///
/// Clones share the same underlying map, so a clone can stand in for the
/// same device storage seen by a fresh process.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl SlotStore for InMemoryStore {
    async fn get(&self, slot: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(slot).cloned())
    }

    async fn set(&self, slot: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(slot.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, slot: &str) -> Result<(), StorageError> {
        let mut guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(slot);
        Ok(())
    }
}

/// Holds the slot store behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub slots: Arc<dyn SlotStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            slots: Arc::new(InMemoryStore::new()),
        }
    }
}
