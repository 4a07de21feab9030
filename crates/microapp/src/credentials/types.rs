//! Core credential types.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Seconds deducted from the server-reported lifetime before a token is
/// considered stale.
pub const SAFETY_MARGIN_SECS: i64 = 600;

/// A cached access token and the instant it stops being usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Build a credential from a freshly fetched token.
    ///
    /// `expires_at = now + expires_in - SAFETY_MARGIN_SECS`. Returns `None`
    /// when the reported lifetime does not fit in a timestamp.
    pub fn from_fetched(fetched: &FetchedToken, now: DateTime<Utc>) -> Option<Self> {
        let expires_at = now
            .checked_add_signed(TimeDelta::try_seconds(fetched.expires_in)?)?
            .checked_sub_signed(TimeDelta::try_seconds(SAFETY_MARGIN_SECS)?)?;
        Some(Self {
            token: fetched.access_token.clone(),
            expires_at,
        })
    }

    /// Whether the credential can still be handed out at `now`.
    #[inline]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Token endpoint result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchedToken {
    pub access_token: String,
    /// Validity in seconds, as reported by the platform.
    pub expires_in: i64,
}

/// Store key derived from the application id.
///
/// Every store addresses entries through this key, so several applications
/// can share one store without seeing each other's tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    app_id: String,
}

impl CredentialKey {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
        }
    }

    #[inline]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Shared-store key holding the token.
    pub fn token_key(&self) -> String {
        format!("{}_access_token", self.app_id)
    }

    /// Shared-store key holding the expiry (unix seconds).
    pub fn expiry_key(&self) -> String {
        format!("{}_access_token_invalidtime", self.app_id)
    }

    /// Local file name holding the token.
    pub fn file_name(&self) -> String {
        format!("{}.access_token", self.app_id)
    }
}
