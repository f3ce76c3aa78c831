//! In-memory credential store.

use std::{collections::HashMap, sync::RwLock};

use relaylink_core::{CredentialStore, StoreError, StoreKey};

/// In-memory storage implementation.
///
/// Useful for tests and embedding. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<StoreKey, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`.
    #[must_use]
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (StoreKey, &'a str)>) -> Self {
        let values = entries
            .into_iter()
            .map(|(key, value)| (key, value.to_owned()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    /// Number of keys currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().map_or(0, |values| values.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        Ok(self
            .values
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(&key)
            .cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert(key, value.to_owned());
        Ok(())
    }

    fn clear(&self, key: StoreKey) -> Result<(), StoreError> {
        self.values
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_are_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get(StoreKey::AccessToken).unwrap(), None);
        assert!(!store.session_flag().unwrap());
        store.clear(StoreKey::AccessToken).unwrap();
    }

    #[test]
    fn last_write_wins() {
        let store = MemoryStore::new();
        store.set(StoreKey::AccessToken, "A").unwrap();
        store.set(StoreKey::AccessToken, "B").unwrap();
        assert_eq!(store.get(StoreKey::AccessToken).unwrap().as_deref(), Some("B"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn flag_requires_exact_true() {
        let store = MemoryStore::with_entries([(StoreKey::SessionFlag, "TRUE")]);
        assert!(!store.session_flag().unwrap());

        store.set(StoreKey::SessionFlag, "true").unwrap();
        assert!(store.session_flag().unwrap());
    }
}
