//! Shared credential store backed by redis.
//!
//! Token and expiry live under two plain keys (`{app_id}_access_token` and
//! `{app_id}_access_token_invalidtime`) without a redis TTL; the manager
//! checks the expiry itself. Several processes or hosts pointing at the same
//! redis therefore share one token per application.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use tracing::debug;

use super::error::StoreError;
use super::store::CredentialStore;
use super::types::{Credential, CredentialKey};

/// Redis-backed [`CredentialStore`].
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to `url` (`redis://host:port/db`), giving up after `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let manager = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!("timed out after {:?} connecting to redis", timeout))
            })??;

        debug!("Connected to shared credential store");
        Ok(Self { manager })
    }

    /// Wrap an existing connection manager.
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl CredentialStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &CredentialKey) -> Result<Option<Credential>, StoreError> {
        let mut conn = self.manager.clone();
        let (token, expiry): (Option<String>, Option<String>) = redis::pipe()
            .get(key.token_key())
            .get(key.expiry_key())
            .query_async(&mut conn)
            .await?;

        let token = match token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => return Ok(None),
        };
        // A token without an expiry is unusable; treat it as absent.
        let Some(expiry) = expiry else {
            return Ok(None);
        };

        Ok(Some(Credential::new(token, parse_expiry(&expiry)?)))
    }

    async fn set(&self, key: &CredentialKey, credential: &Credential) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .set(key.token_key(), &credential.token)
            .ignore()
            .set(key.expiry_key(), credential.expires_at.timestamp().to_string())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

/// Parse an expiry written as unix seconds, integer or fractional.
fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw = raw.trim();
    let secs = match raw.parse::<i64>() {
        Ok(secs) => secs,
        Err(_) => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.floor() as i64)
            .ok_or_else(|| StoreError::Corrupt(format!("invalid expiry value {raw:?}")))?,
    };
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Corrupt(format!("expiry out of range: {secs}")))
}
