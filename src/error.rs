//! Payout error taxonomy.
//!
//! Every failure surfaced to a caller maps onto one stable [`ErrorKind`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::ProviderError;

/// Stable, machine-readable error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidRequest,
    InsufficientFunds,
    DustOutput,
    DustChange,
    IdempotencyConflict,
    ProviderUnavailable,
    BroadcastRejected,
    SigningFailed,
    InternalInconsistency,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::InsufficientFunds => "InsufficientFunds",
            ErrorKind::DustOutput => "DustOutput",
            ErrorKind::DustChange => "DustChange",
            ErrorKind::IdempotencyConflict => "IdempotencyConflict",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::BroadcastRejected => "BroadcastRejected",
            ErrorKind::SigningFailed => "SigningFailed",
            ErrorKind::InternalInconsistency => "InternalInconsistency",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the payout pipeline.
#[derive(Debug, Clone, Error)]
pub enum PayoutError {
    /// Malformed or missing request fields.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No subset of the available outputs covers target plus fee.
    #[error("Insufficient funds: have {available_sats} sats, need at least {required_sats} sats")]
    InsufficientFunds {
        available_sats: u64,
        required_sats: u64,
    },

    /// A payment output would be below the dust threshold.
    #[error("Output of {value_sats} sats is below dust threshold {dust_threshold}")]
    DustOutput { value_sats: u64, dust_threshold: u64 },

    /// A change output would be below the dust threshold.
    #[error("Change of {change_sats} sats is below dust threshold {dust_threshold}")]
    DustChange { change_sats: u64, dust_threshold: u64 },

    /// Idempotency key reused with a different request, or still in flight.
    #[error("Idempotency conflict for key '{key}': {detail}")]
    IdempotencyConflict { key: String, detail: String },

    /// Provider could not be reached or answered with a failure.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider refused the broadcast.
    #[error("Broadcast rejected: {message}")]
    BroadcastRejected { message: String, retryable: bool },

    /// External signer failed.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// State that should be impossible, including storage failures.
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),
}

impl PayoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PayoutError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            PayoutError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            PayoutError::DustOutput { .. } => ErrorKind::DustOutput,
            PayoutError::DustChange { .. } => ErrorKind::DustChange,
            PayoutError::IdempotencyConflict { .. } => ErrorKind::IdempotencyConflict,
            PayoutError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            PayoutError::BroadcastRejected { .. } => ErrorKind::BroadcastRejected,
            PayoutError::SigningFailed(_) => ErrorKind::SigningFailed,
            PayoutError::InternalInconsistency(_) => ErrorKind::InternalInconsistency,
        }
    }
}

impl From<ProviderError> for PayoutError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Rejected { reason, message } => PayoutError::BroadcastRejected {
                message,
                retryable: reason.is_retryable(),
            },
            other => PayoutError::ProviderUnavailable(other.to_string()),
        }
    }
}

/// Result type for payout operations.
pub type PayoutResult<T> = Result<T, PayoutError>;
