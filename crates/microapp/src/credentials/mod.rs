//! Access token caching.
//!
//! # Architecture
//!
//! - [`CredentialStore`]: Where tokens are kept between calls and processes
//!   ([`RedisStore`], [`FileStore`], [`MemoryStore`])
//! - [`TokenFetcher`]: How a new token is obtained ([`HttpTokenFetcher`])
//! - [`Clock`]: Time source used for expiry decisions
//! - [`CredentialManager`]: Ties the three together and decides when to refresh

mod clock;
mod error;
mod fetcher;
mod file_store;
mod manager;
mod memory_store;
mod redis_store;
mod store;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StoreError;
pub use fetcher::{HttpTokenFetcher, TokenFetcher};
pub use file_store::FileStore;
pub use manager::CredentialManager;
pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;
pub use store::CredentialStore;
pub use types::{Credential, CredentialKey, FetchedToken, SAFETY_MARGIN_SECS};
