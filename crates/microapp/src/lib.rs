//! Server-side SDK for ByteDance (toutiao / douyin) mini apps.
//!
//! The centre of the crate is the access token cache in [`credentials`]:
//! tokens are fetched lazily, shared through redis or a local file, and
//! refreshed ten minutes before the platform expires them. [`MiniAppClient`]
//! attaches the token to the endpoint wrappers.
//!
//! ```no_run
//! # async fn demo() -> bytedance_microapp::Result<()> {
//! use bytedance_microapp::{MiniAppClient, StoreMode};
//!
//! let client = MiniAppClient::builder("tt0123456789", "secret")
//!     .store_mode(StoreMode::Local)
//!     .build()
//!     .await?;
//! let session = client.code_to_session(Some("login-code"), None).await?;
//! println!("{}", session.openid);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod models;
pub mod sign;

pub use client::{ClientBuilder, MiniAppClient};
pub use config::{ClientConfig, SharedStoreConfig, StoreMode};
pub use credentials::{
    Clock, Credential, CredentialKey, CredentialManager, CredentialStore, FileStore,
    HttpTokenFetcher, MemoryStore, RedisStore, StoreError, TokenFetcher,
};
pub use error::{Error, ErrorKind, Result};
pub use models::{AppName, Code2Session, KvItem, QrCode, QrCodeOptions, Rgb};
pub use sign::HMAC_SHA256;
