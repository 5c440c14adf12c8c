//! Idempotency ledger types.

use serde::{Deserialize, Serialize};

/// Lifecycle of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    /// Side effect parked or in flight.
    Pending,
    /// Side effect succeeded; result is replayable.
    Confirmed,
    /// Side effect ended in a terminal failure; result is replayable.
    Failed,
}

impl LedgerStatus {
    /// Convert to database string representation
    pub fn as_db_str(self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Confirmed => "confirmed",
            LedgerStatus::Failed => "failed",
        }
    }

    /// Parse from database string
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LedgerStatus::Pending),
            "confirmed" => Some(LedgerStatus::Confirmed),
            "failed" => Some(LedgerStatus::Failed),
            _ => None,
        }
    }

    pub fn is_final(self) -> bool {
        !matches!(self, LedgerStatus::Pending)
    }
}

/// One client command, keyed by its idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    /// Hex SHA-256 of the normalized request; bound to `key` forever.
    pub request_hash: String,
    pub status: LedgerStatus,
    /// Serialized response, present once finalized.
    pub result_payload: Option<String>,
    pub attempt_count: u32,
    /// Unix seconds of the last write.
    pub stored_at: u64,
}

impl IdempotencyRecord {
    pub fn pending(key: &str, request_hash: &str, now: u64) -> Self {
        Self {
            key: key.to_string(),
            request_hash: request_hash.to_string(),
            status: LedgerStatus::Pending,
            result_payload: None,
            attempt_count: 0,
            stored_at: now,
        }
    }
}

/// Answer from [`IdempotencyLedger::begin`](crate::idempotency::IdempotencyLedger::begin).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginOutcome {
    /// This call owns the key and must execute the command.
    pub is_new: bool,
    /// Stored result of an earlier, finalized execution.
    pub prior_result: Option<String>,
    /// The record is still pending past the lease: its owner is gone and the
    /// outcome is unknown.
    pub stale: bool,
}
