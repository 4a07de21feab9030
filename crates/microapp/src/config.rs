//! Client configuration.
//!
//! A [`ClientConfig`] can be built in code, deserialized from TOML/JSON, or
//! read from `MICROAPP_*` environment variables (a `.env` file is honoured).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::{CredentialKey, FileStore};
use crate::error::{Error, Result};
use crate::http::{DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT};

/// Default shared store location.
pub const DEFAULT_REDIS_URL: &str = "redis://redis:6379/";

/// How long `auto` / `shared` modes wait for the shared store.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const ENV_APP_ID: &str = "MICROAPP_APP_ID";
const ENV_APP_SECRET: &str = "MICROAPP_APP_SECRET";
const ENV_STORE_MODE: &str = "MICROAPP_STORE_MODE";
const ENV_REDIS_URL: &str = "MICROAPP_REDIS_URL";
const ENV_TOKEN_PATH: &str = "MICROAPP_TOKEN_PATH";
const ENV_BASE_URL: &str = "MICROAPP_BASE_URL";
const ENV_REQUEST_TIMEOUT: &str = "MICROAPP_REQUEST_TIMEOUT_SECS";

/// Where access tokens are cached.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Shared store when reachable at construction, local file otherwise.
    #[default]
    #[strum(to_string = "auto")]
    Auto,
    /// Shared store only; construction fails when it is unreachable.
    #[strum(to_string = "shared", serialize = "redis")]
    #[serde(alias = "redis")]
    Shared,
    /// Local file only.
    #[strum(to_string = "local", serialize = "file")]
    #[serde(alias = "file")]
    Local,
}

/// Shared (redis) store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedStoreConfig {
    /// `redis://[:password@]host:port/db`
    pub url: String,
    #[serde(rename = "connect_timeout_secs", with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for SharedStoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl SharedStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Settings for one application.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub app_id: String,
    pub app_secret: String,
    #[serde(default)]
    pub store_mode: StoreMode,
    /// Shared store settings; defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_store: Option<SharedStoreConfig>,
    /// Token file for the local store; defaults to `$HOME/{app_id}.access_token`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(
        default = "default_request_timeout",
        rename = "request_timeout_secs",
        with = "duration_secs"
    )]
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("store_mode", &self.store_mode)
            .field("shared_store", &self.shared_store)
            .field("local_path", &self.local_path)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl ClientConfig {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            store_mode: StoreMode::default(),
            shared_store: None,
            local_path: None,
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
        }
    }

    /// Read the configuration from `MICROAPP_*` environment variables,
    /// loading a `.env` file first when one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Apply the optional `MICROAPP_*` settings (everything but the app id
    /// and secret) on top of this configuration.
    pub fn apply_env(&mut self) -> Result<()> {
        dotenvy::dotenv().ok();
        self.apply_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            non_empty(lookup(name)).ok_or_else(|| Error::config(format!("{name} is not set")))
        };

        let mut config = Self::new(required(ENV_APP_ID)?, required(ENV_APP_SECRET)?);
        config.apply_lookup(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_lookup(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| non_empty(lookup(name));

        if let Some(mode) = var(ENV_STORE_MODE) {
            self.store_mode = parse_store_mode(&mode)?;
        }
        if let Some(url) = var(ENV_REDIS_URL) {
            self.shared_store = Some(SharedStoreConfig::new(url));
        }
        if let Some(path) = var(ENV_TOKEN_PATH) {
            self.local_path = Some(PathBuf::from(path));
        }
        if let Some(base_url) = var(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(secs) = var(ENV_REQUEST_TIMEOUT) {
            let secs: u64 = secs.parse().map_err(|_| {
                Error::config(format!(
                    "{ENV_REQUEST_TIMEOUT} must be whole seconds, got {secs:?}"
                ))
            })?;
            self.request_timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(Error::config("app_id must not be empty"));
        }
        if self.app_secret.trim().is_empty() {
            return Err(Error::config("app_secret must not be empty"));
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::config("base_url must not be empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request_timeout must be positive"));
        }
        if let Some(shared) = &self.shared_store {
            if shared.url.trim().is_empty() {
                return Err(Error::config("shared_store.url must not be empty"));
            }
        }
        Ok(())
    }

    /// Shared store settings, falling back to the defaults.
    pub fn shared_store_or_default(&self) -> SharedStoreConfig {
        self.shared_store.clone().unwrap_or_default()
    }

    /// File used by the local store.
    pub fn local_store_path(&self) -> PathBuf {
        match &self.local_path {
            Some(path) => path.clone(),
            None => {
                let key = CredentialKey::new(self.app_id.as_str());
                FileStore::default_dir().join(key.file_name())
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a store mode name, accepting the `redis` / `file` aliases.
pub fn parse_store_mode(value: &str) -> Result<StoreMode> {
    value.trim().parse().map_err(|_| {
        Error::config(format!(
            "unknown store mode {value:?}, expected auto, shared or local"
        ))
    })
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
