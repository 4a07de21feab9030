//! In-process credential store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::error::StoreError;
use super::store::CredentialStore;
use super::types::{Credential, CredentialKey};

/// [`CredentialStore`] kept in memory.
///
/// Useful when several clients in one process should share tokens without a
/// shared store, and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Credential>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &CredentialKey) -> Result<Option<Credential>, StoreError> {
        Ok(self.entries.get(&key.token_key()).map(|e| e.value().clone()))
    }

    async fn set(&self, key: &CredentialKey, credential: &Credential) -> Result<(), StoreError> {
        self.entries.insert(key.token_key(), credential.clone());
        Ok(())
    }
}
