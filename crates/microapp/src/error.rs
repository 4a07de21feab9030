//! SDK-wide error types.

use thiserror::Error;

use crate::credentials::StoreError;

/// SDK-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration or arguments; fixing the call site is required.
    Config,
    /// The platform answered with a non-zero error code.
    Upstream,
    /// Network, I/O or decoding failure between us and the platform or store.
    Transport,
}

/// SDK-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The platform response envelope carried a non-zero error code.
    #[error("error:{code} , message:{message}")]
    Upstream { code: i64, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn upstream(code: i64, message: impl Into<String>) -> Self {
        Self::Upstream {
            code,
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::InvalidArgument(_) => ErrorKind::Config,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Http(_) | Self::Store(_) | Self::Io(_) | Self::Json(_) | Self::Decode(_) => {
                ErrorKind::Transport
            }
        }
    }

    /// Platform error code, if this is an upstream error.
    pub fn upstream_code(&self) -> Option<i64> {
        match self {
            Self::Upstream { code, .. } => Some(*code),
            _ => None,
        }
    }

    #[inline]
    pub fn is_upstream(&self) -> bool {
        self.kind() == ErrorKind::Upstream
    }

    #[inline]
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}
