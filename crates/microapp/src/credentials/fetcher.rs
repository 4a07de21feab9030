//! Access token acquisition.
//!
//! Exchanges the application id / secret pair for a fresh token via
//! `GET /apps/token?grant_type=client_credential`. This is the cache-miss
//! path, so it never consults a store.

use async_trait::async_trait;
use tracing::debug;

use super::types::FetchedToken;
use crate::error::{Error, Result};
use crate::http::ApiTransport;

const TOKEN_PATH: &str = "/token";
const GRANT_TYPE: &str = "client_credential";

#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Obtain a new token and its validity in seconds.
    ///
    /// A platform error code surfaces as [`Error::Upstream`] with the code
    /// and message untouched.
    async fn fetch(&self, app_id: &str, app_secret: &str) -> Result<FetchedToken>;
}

/// [`TokenFetcher`] calling the platform token endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenFetcher {
    transport: ApiTransport,
}

impl HttpTokenFetcher {
    pub fn new(transport: ApiTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TokenFetcher for HttpTokenFetcher {
    async fn fetch(&self, app_id: &str, app_secret: &str) -> Result<FetchedToken> {
        let params = [
            ("grant_type", GRANT_TYPE.to_string()),
            ("appid", app_id.to_string()),
            ("secret", app_secret.to_string()),
        ];

        let url = self.transport.url("/apps", TOKEN_PATH);
        let response = self.transport.get(&url, &params).await?;
        let payload = response.into_result()?;

        let access_token = payload
            .get("access_token")
            .and_then(|t| t.as_str())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Decode("No access_token in token response".to_string()))?
            .trim()
            .to_string();

        let expires_in = payload
            .get("expires_in")
            .and_then(|e| e.as_i64().or_else(|| e.as_str()?.parse().ok()))
            .ok_or_else(|| Error::Decode("No expires_in in token response".to_string()))?;

        debug!(app_id, expires_in, "Fetched access token");

        Ok(FetchedToken {
            access_token,
            expires_in,
        })
    }
}
