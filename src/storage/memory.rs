//! In-memory grant store.

use crate::models::GrantedPermissionSet;
use crate::storage::traits::GrantStore;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Grant store backed by a map; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryGrantStore {
    values: RwLock<HashMap<String, GrantedPermissionSet>>,
}

impl MemoryGrantStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a value is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values
            .read()
            .is_ok_and(|values| values.contains_key(key))
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::operation("grant_store_lock", "lock poisoned")
}

impl GrantStore for MemoryGrantStore {
    fn load(&self, key: &str) -> Result<Option<GrantedPermissionSet>> {
        Ok(self.values.read().map_err(poisoned)?.get(key).cloned())
    }

    fn save(&self, key: &str, grants: &GrantedPermissionSet) -> Result<()> {
        self.values
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), grants.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.values.write().map_err(poisoned)?.remove(key).is_some())
    }
}
