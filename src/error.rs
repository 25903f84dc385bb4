//! Crate-wide error type.
//!
//! One variant per error kind named in the design ("Error kinds (not type
//! names)"). Each has a constructor helper so call sites read like
//! `FloridifyError::not_found(format!("corpus {id}"))` rather than
//! matching on struct literals.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FloridifyError>;

#[derive(Debug, Error)]
pub enum FloridifyError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt content: {0}")]
    CorruptContent(String),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("cycle detected: {0}")]
    CycleDetected(String),

    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("encryption key required: {0}")]
    EncryptionKeyRequired(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl FloridifyError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn corrupt_content(msg: impl Into<String>) -> Self {
        Self::CorruptContent(msg.into())
    }

    pub fn corrupt_index(msg: impl Into<String>) -> Self {
        Self::CorruptIndex(msg.into())
    }

    pub fn unknown_resource_type(msg: impl Into<String>) -> Self {
        Self::UnknownResourceType(msg.into())
    }

    pub fn cycle_detected(msg: impl Into<String>) -> Self {
        Self::CycleDetected(msg.into())
    }

    pub fn version_conflict(msg: impl Into<String>) -> Self {
        Self::VersionConflict(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::PersistenceError(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::ProviderError(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn encryption_key_required(msg: impl Into<String>) -> Self {
        Self::EncryptionKeyRequired(msg.into())
    }

    /// True for errors that a retrying caller might plausibly succeed on later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::ProviderError(_) | Self::Timeout(_))
    }
}
