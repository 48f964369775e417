//! Error types for push dispatch and subscription ownership.
//!
//! Call-level failures are [`PushError`]. Per-endpoint delivery failures are
//! [`TransportFailure`](crate::notifications::transport::TransportFailure)
//! and never escape the dispatcher: they are reported as data in the
//! [`DeliverySummary`](crate::notifications::dispatch::DeliverySummary).

use thiserror::Error;

/// Why the configured VAPID key material cannot be used.
///
/// `Clone` because the key cache holds on to the first failure and hands it
/// to every later dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyMaterialError {
    /// No private key was configured.
    #[error("VAPID private key is not configured (set VAPID_PRIVATE_KEY)")]
    Missing,

    /// The PEM text could not be decoded after normalization.
    #[error("VAPID private key PEM is malformed: {0}")]
    MalformedPem(String),

    /// The PEM label is not one we know how to parse.
    #[error("unsupported PEM label '{0}' (expected PRIVATE KEY or EC PRIVATE KEY)")]
    UnsupportedLabel(String),

    /// The key decoded but is not a usable P-256 private key.
    #[error("VAPID private key is not a valid P-256 key: {0}")]
    InvalidPrivateKey(String),

    /// The independently supplied public key is not a 65-byte uncompressed P-256 point.
    #[error("VAPID public key is invalid: {0}")]
    InvalidPublicKey(String),

    /// The supplied public key does not belong to the configured private key.
    #[error("VAPID public key does not match the configured private key")]
    PublicKeyMismatch,
}

/// Result type for key material operations.
pub type KeyResult<T> = std::result::Result<T, KeyMaterialError>;

/// Persistence backend failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("subscription store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file holds something other than a subscription list.
    #[error("subscription store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Call-level error for subscribe, unsubscribe, dispatch and key retrieval.
#[derive(Debug, Error)]
pub enum PushError {
    /// Malformed subscription data. Names the offending field.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Field that failed validation (`endpoint`, `p256dh`, `auth`, ...).
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// Missing caller identity, or acting on something the caller may not touch.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Signing key absent or unusable. Fatal to dispatch only.
    #[error("configuration error: {0}")]
    Configuration(#[from] KeyMaterialError),

    /// The notification payload could not be serialized.
    #[error("failed to serialize notification payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The subscription repository failed.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl PushError {
    /// Shorthand for a [`PushError::Validation`].
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`PushError::Unauthorized`].
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized(reason.into())
    }

    /// Whether this error is the operator's fault (bad key configuration).
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Result type for push operations.
pub type PushResult<T> = std::result::Result<T, PushError>;
