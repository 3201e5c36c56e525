//! Durable key-value store contract.
//!
//! The core only ever talks to persistence through [`KvStore`], so a local
//! SQLite file and an authenticated remote backend are interchangeable.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StorageError;

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Write every entry or none of them.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError>;

    fn remove(&self, keys: &[&str]) -> Result<(), StorageError>;
}

/// In-process store. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        let mut map = self.entries();
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut map = self.entries();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}
