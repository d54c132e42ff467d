//! In-process credential store

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::Result;

use super::{CredentialStore, StoreKey};

/// Credential store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: RwLock<HashMap<StoreKey, String>>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>> {
        Ok(self.values.read().get(&key).cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<()> {
        self.values.write().insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<()> {
        self.values.write().remove(&key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.values.write().clear();
        Ok(())
    }
}
