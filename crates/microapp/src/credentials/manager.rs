//! Access token lifecycle for one application.
//!
//! [`CredentialManager::get_token`] returns the cached token while it is
//! fresh and otherwise fetches a new one, writes it back to the store and
//! returns it. Store read failures count as a miss and store write failures
//! are logged and ignored; fetch failures always reach the caller and are
//! never cached or retried here.
//!
//! Concurrent callers in one process are collapsed onto a single refresh by
//! an async mutex plus a re-check of the store once the lock is held. Across
//! processes sharing a store there is no distributed lock, so two processes
//! that see a stale token at the same moment may both refresh it. Both
//! tokens are valid and the last write wins.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::fetcher::TokenFetcher;
use super::store::CredentialStore;
use super::types::{Credential, CredentialKey, SAFETY_MARGIN_SECS};
use crate::error::{Error, Result};

/// Owns the refresh policy for one application id.
pub struct CredentialManager {
    app_id: String,
    app_secret: String,
    key: CredentialKey,
    store: Arc<dyn CredentialStore>,
    fetcher: Arc<dyn TokenFetcher>,
    clock: Arc<dyn Clock>,
    /// Serializes refreshes within this process.
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("app_id", &self.app_id)
            .field("store", &self.store.name())
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        store: Arc<dyn CredentialStore>,
        fetcher: Arc<dyn TokenFetcher>,
    ) -> Self {
        let app_id = app_id.into();
        Self {
            key: CredentialKey::new(app_id.clone()),
            app_id,
            app_secret: app_secret.into(),
            store,
            fetcher,
            clock: Arc::new(SystemClock),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn key(&self) -> &CredentialKey {
        &self.key
    }

    /// Name of the backing store.
    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Current access token, refreshing it when absent or stale.
    #[instrument(skip(self), fields(app_id = %self.app_id, store = self.store.name()))]
    pub async fn get_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Double-check after acquiring lock (another task may have refreshed)
        if let Some(token) = self.cached_token().await {
            debug!("Token refreshed by a concurrent caller");
            return Ok(token);
        }

        self.refresh().await
    }

    /// Mark the stored token as expired so the next [`get_token`](Self::get_token)
    /// fetches a new one.
    pub async fn invalidate(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(current) = self.store.get(&self.key).await? {
            let expired = Credential::new(current.token, self.clock.now());
            self.store.set(&self.key, &expired).await?;
            info!(app_id = %self.app_id, "Access token invalidated");
        }
        Ok(())
    }

    /// Fresh token from the store, if there is one.
    async fn cached_token(&self) -> Option<String> {
        let now = self.clock.now();
        match self.store.get(&self.key).await {
            Ok(Some(credential)) if credential.is_fresh(now) => Some(credential.token),
            Ok(Some(credential)) => {
                debug!(expires_at = %credential.expires_at, "Cached access token is stale");
                None
            }
            Ok(None) => {
                debug!("No cached access token");
                None
            }
            Err(e) => {
                warn!(error = %e, "Credential store read failed, treating as a miss");
                None
            }
        }
    }

    async fn refresh(&self) -> Result<String> {
        let now = self.clock.now();

        let fetched = match self.fetcher.fetch(&self.app_id, &self.app_secret).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(error = %e, "Access token fetch failed");
                return Err(e);
            }
        };

        if fetched.expires_in <= SAFETY_MARGIN_SECS {
            warn!(
                expires_in = fetched.expires_in,
                "Token lifetime is within the safety margin; it will be refetched on every call"
            );
        }

        let Some(credential) = Credential::from_fetched(&fetched, now) else {
            warn!(
                expires_in = fetched.expires_in,
                "Token lifetime is out of range"
            );
            return Err(Error::Decode(format!(
                "expires_in {} out of range",
                fetched.expires_in
            )));
        };

        if let Err(e) = self.store.set(&self.key, &credential).await {
            warn!(error = %e, "Failed to cache access token (non-fatal)");
        }

        info!(expires_at = %credential.expires_at, "Access token refreshed");
        Ok(credential.token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::credentials::clock::ManualClock;
    use crate::credentials::error::StoreError;
    use crate::credentials::memory_store::MemoryStore;
    use crate::credentials::types::FetchedToken;

    /// Hands out `token-1`, `token-2`, ... and counts calls.
    struct CountingFetcher {
        calls: AtomicUsize,
        expires_in: i64,
        delay: Duration,
    }

    impl CountingFetcher {
        fn new(expires_in: i64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                expires_in,
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenFetcher for CountingFetcher {
        async fn fetch(&self, _app_id: &str, _app_secret: &str) -> Result<FetchedToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(FetchedToken {
                access_token: format!("token-{n}"),
                expires_in: self.expires_in,
            })
        }
    }

    /// Fails like the platform does for a bad app id.
    struct RejectingFetcher;

    #[async_trait]
    impl TokenFetcher for RejectingFetcher {
        async fn fetch(&self, _app_id: &str, _app_secret: &str) -> Result<FetchedToken> {
            Err(Error::upstream(40001, "invalid appid"))
        }
    }

    /// Store whose reads and/or writes always fail.
    struct BrokenStore {
        fail_get: bool,
        fail_set: bool,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl CredentialStore for BrokenStore {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn get(&self, _key: &CredentialKey) -> std::result::Result<Option<Credential>, StoreError> {
            if self.fail_get {
                Err(StoreError::Unavailable("down".to_string()))
            } else {
                Ok(None)
            }
        }

        async fn set(
            &self,
            _key: &CredentialKey,
            _credential: &Credential,
        ) -> std::result::Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_set {
                Err(StoreError::Unavailable("down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn manager(
        app_id: &str,
        store: Arc<dyn CredentialStore>,
        fetcher: Arc<dyn TokenFetcher>,
        clock: Arc<ManualClock>,
    ) -> CredentialManager {
        CredentialManager::new(app_id, "secret1", store, fetcher).with_clock(clock)
    }

    #[tokio::test]
    async fn test_refresh_then_serve_from_cache() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(CountingFetcher::new(7200));
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let manager = manager("app1", store.clone(), fetcher.clone(), clock.clone());

        let first = manager.get_token().await.unwrap();
        let second = manager.get_token().await.unwrap();

        assert_eq!(first, "token-1");
        assert_eq!(first, second);
        assert_eq!(fetcher.calls(), 1);

        let stored = store.get(manager.key()).await.unwrap().unwrap();
        assert_eq!(stored.token, "token-1");
        assert_eq!(stored.expires_at.timestamp(), 1_000 + 7200 - 600);
    }

    #[tokio::test]
    async fn test_expiry_timeline() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(CountingFetcher::new(3600));
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let manager = manager("app1", store.clone(), fetcher.clone(), clock.clone());

        assert_eq!(manager.get_token().await.unwrap(), "token-1");
        let stored = store.get(manager.key()).await.unwrap().unwrap();
        assert_eq!(stored.expires_at.timestamp(), 4_000);

        clock.set_unix(2_000);
        assert_eq!(manager.get_token().await.unwrap(), "token-1");
        assert_eq!(fetcher.calls(), 1);

        clock.set_unix(4_100);
        assert_eq!(manager.get_token().await.unwrap(), "token-2");
        assert_eq!(fetcher.calls(), 2);

        let stored = store.get(manager.key()).await.unwrap().unwrap();
        assert_eq!(stored.expires_at.timestamp(), 4_100 + 3000);
    }

    #[tokio::test]
    async fn test_exact_expiry_instant_is_stale() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(CountingFetcher::new(3600));
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let manager = manager("app1", store, fetcher.clone(), clock.clone());

        manager.get_token().await.unwrap();
        clock.set_unix(4_000);
        assert_eq!(manager.get_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_upstream_error_is_surfaced_and_not_cached() {
        let store = Arc::new(BrokenStore {
            fail_get: false,
            fail_set: false,
            writes: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let manager = manager("app1", store.clone(), Arc::new(RejectingFetcher), clock);

        let err = manager.get_token().await.unwrap_err();
        assert_eq!(err.upstream_code(), Some(40001));
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_is_an_error() {
        let store = Arc::new(BrokenStore {
            fail_get: false,
            fail_set: false,
            writes: AtomicUsize::new(0),
        });
        let fetcher = Arc::new(CountingFetcher::new(i64::MAX));
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let manager = manager("app1", store.clone(), fetcher.clone(), clock);

        let err = manager.get_token().await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "{err:?}");
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_read_failure_triggers_refresh() {
        let store = Arc::new(BrokenStore {
            fail_get: true,
            fail_set: false,
            writes: AtomicUsize::new(0),
        });
        let fetcher = Arc::new(CountingFetcher::new(7200));
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let manager = manager("app1", store.clone(), fetcher.clone(), clock);

        assert_eq!(manager.get_token().await.unwrap(), "token-1");
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_write_failure_still_returns_token() {
        let store = Arc::new(BrokenStore {
            fail_get: false,
            fail_set: true,
            writes: AtomicUsize::new(0),
        });
        let fetcher = Arc::new(CountingFetcher::new(7200));
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let manager = manager("app1", store, fetcher.clone(), clock);

        assert_eq!(manager.get_token().await.unwrap(), "token-1");
        // Nothing was cached, so the next call fetches again.
        assert_eq!(manager.get_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_apps_sharing_a_store_are_isolated() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let fetcher1 = Arc::new(CountingFetcher::new(7200));
        let fetcher2 = Arc::new(CountingFetcher::new(7200));
        let app1 = manager("app1", store.clone(), fetcher1.clone(), clock.clone());
        let app2 = manager("app2", store.clone(), fetcher2.clone(), clock.clone());

        app1.get_token().await.unwrap();
        app2.get_token().await.unwrap();
        app1.get_token().await.unwrap();
        app2.get_token().await.unwrap();

        assert_eq!(fetcher1.calls(), 1);
        assert_eq!(fetcher2.calls(), 1);
        assert_eq!(store.len(), 2);
        assert_ne!(app1.key().token_key(), app2.key().token_key());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            expires_in: 7200,
            delay: Duration::from_millis(50),
        });
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let manager = Arc::new(manager("app1", store, fetcher.clone(), clock));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "token-1");
        }
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(CountingFetcher::new(7200));
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let manager = manager("app1", store, fetcher.clone(), clock);

        assert_eq!(manager.get_token().await.unwrap(), "token-1");
        manager.invalidate().await.unwrap();
        assert_eq!(manager.get_token().await.unwrap(), "token-2");
        assert_eq!(fetcher.calls(), 2);
    }
}
