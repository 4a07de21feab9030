//! Credential persistence abstraction.
//!
//! A store is a plain key-value surface: it persists a [`Credential`] under a
//! [`CredentialKey`] and hands it back. Expiry decisions belong to the
//! [`CredentialManager`](super::CredentialManager), so stores never apply a
//! TTL of their own.

use async_trait::async_trait;

use super::error::StoreError;
use super::types::{Credential, CredentialKey};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Short backend name for logs (e.g. "redis", "file").
    fn name(&self) -> &'static str;

    /// Load the credential stored under `key`.
    ///
    /// # Returns
    /// * `Ok(Some(..))` - An entry exists (it may already be stale)
    /// * `Ok(None)` - Nothing stored for this key
    /// * `Err(...)` - The backend could not be reached or read
    async fn get(&self, key: &CredentialKey) -> Result<Option<Credential>, StoreError>;

    /// Store `credential` under `key`, replacing any previous entry.
    async fn set(&self, key: &CredentialKey, credential: &Credential) -> Result<(), StoreError>;
}
