//! Shared primitives for all Rust crates in Mesosync.

#![forbid(unsafe_code)]

/// Network endpoint primitives shared across services.
pub mod endpoint;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use endpoint::HostPort;

/// Result type used across Mesosync crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid configuration or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// The coordination service currently reports no elected leader.
    #[error("no leader: {0}")]
    NoLeader(String),

    /// The leader could not be reached over HTTP.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// A state document or coordination payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The coordination service failed or dropped the session.
    #[error("coordination error: {0}")]
    Coordination(String),

    /// A registry call failed.
    #[error("registry error: {0}")]
    Registry(String),

    /// A bounded wait elapsed without a result.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether the error only invalidates the current refresh cycle.
    #[must_use]
    pub fn is_cycle_scoped(&self) -> bool {
        matches!(
            self,
            Self::NoLeader(_)
                | Self::Unreachable(_)
                | Self::Decode(_)
                | Self::Coordination(_)
                | Self::Registry(_)
        )
    }
}
