//! Chain-provider types and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export ProviderConfig from config module to avoid duplication
pub use crate::config::schema::ProviderConfig;

/// A spendable output as reported by the chain provider.
///
/// This is a read-only snapshot; selection never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// Funding transaction id (64 lowercase hex chars).
    pub txid: String,
    /// Output index within the funding transaction.
    pub output_index: u32,
    /// Value in satoshis.
    pub value_sats: u64,
    /// Locking script, hex encoded. Empty when the provider omits it.
    pub script_pubkey: String,
    /// Number of confirmations (0 for mempool outputs).
    pub confirmations: u32,
}

/// Result of a successful broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReceipt {
    /// Transaction id reported by the provider.
    pub txid: String,
    /// Provider already had this transaction.
    pub already_known: bool,
}

/// Confirmation state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TxStatus {
    pub confirmed: bool,
    pub confirmations: u64,
    pub block_height: Option<u64>,
}

/// Raw status document. Explorers disagree on field names, so every known
/// spelling is captured separately and merged.
#[derive(Debug, Default, Deserialize)]
struct RawTxStatus {
    confirmed: Option<bool>,
    #[serde(rename = "isConfirmed")]
    is_confirmed: Option<bool>,
    valid: Option<bool>,
    confirmations: Option<u64>,
    confs: Option<u64>,
    blockheight: Option<u64>,
    #[serde(rename = "blockHeight")]
    block_height_camel: Option<u64>,
    height: Option<u64>,
    block_height: Option<u64>,
}

impl From<RawTxStatus> for TxStatus {
    fn from(raw: RawTxStatus) -> Self {
        let confirmed = raw
            .confirmed
            .or(raw.is_confirmed)
            .or(raw.valid)
            .unwrap_or(false);
        let counted = raw.confirmations.or(raw.confs).unwrap_or(0);
        // Confirmed but uncounted means at least one block.
        let confirmations = if confirmed { counted.max(1) } else { counted };
        let block_height = raw
            .blockheight
            .or(raw.block_height_camel)
            .or(raw.height)
            .or(raw.block_height);

        Self {
            confirmed,
            confirmations,
            block_height,
        }
    }
}

impl<'de> Deserialize<'de> for TxStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        RawTxStatus::deserialize(deserializer).map(TxStatus::from)
    }
}

/// Typed reason attached to a broadcast rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Conflicts with a transaction already in the mempool.
    MempoolConflict,
    /// The node already knows this transaction.
    AlreadyKnown,
    /// The transaction is already in the mempool.
    AlreadyInMempool,
    /// One of the inputs was spent meanwhile.
    AlreadySpent,
    /// Anything else: malformed, non-standard, insufficient fee, ...
    Other,
}

impl RejectReason {
    /// Transient rejections may succeed on a later attempt.
    pub fn is_retryable(self) -> bool {
        !matches!(self, RejectReason::Other)
    }

    /// The node already holds this exact transaction, so it is on the network.
    pub fn is_already_broadcast(self) -> bool {
        matches!(self, RejectReason::AlreadyKnown | RejectReason::AlreadyInMempool)
    }

    /// Classify an upstream rejection body. Only the provider adapter calls
    /// this; the rest of the crate works with the typed reason.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("txn-mempool-conflict") || lower.contains("mempool conflict") {
            RejectReason::MempoolConflict
        } else if lower.contains("txn-already-known") || lower.contains("already known") {
            RejectReason::AlreadyKnown
        } else if lower.contains("txn-already-in-mempool") || lower.contains("already in mempool") {
            RejectReason::AlreadyInMempool
        } else if lower.contains("missingorspent")
            || lower.contains("missing-inputs")
            || lower.contains("already spent")
        {
            RejectReason::AlreadySpent
        } else {
            RejectReason::Other
        }
    }
}

/// Errors that can occur while talking to the chain provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Provider answered with a non-success response or could not be reached.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Provider rejected a broadcast.
    #[error("Broadcast rejected ({reason:?}): {message}")]
    Rejected { reason: RejectReason, message: String },

    /// Provider call exceeded its deadline.
    #[error("Provider timeout after {0} ms")]
    Timeout(u64),

    /// Provider answered with a body we could not interpret.
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether the failed call may be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Rejected { reason, .. } => reason.is_retryable(),
            ProviderError::Timeout(_) | ProviderError::Unavailable(_) => true,
            ProviderError::Malformed(_) => false,
        }
    }

    /// Rejection saying the broadcast already landed.
    pub fn is_already_broadcast(&self) -> bool {
        matches!(self, ProviderError::Rejected { reason, .. } if reason.is_already_broadcast())
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// `true` for a 64-char lowercase hex transaction id.
pub fn is_valid_txid(txid: &str) -> bool {
    txid.len() == 64 && txid.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_field_aliases() {
        let s: TxStatus = serde_json::from_str(r#"{"confirmed":true,"block_height":812000}"#).unwrap();
        assert!(s.confirmed);
        assert_eq!(s.confirmations, 1);
        assert_eq!(s.block_height, Some(812000));

        let s: TxStatus = serde_json::from_str(r#"{"isConfirmed":true,"confs":6,"blockHeight":10}"#).unwrap();
        assert!(s.confirmed);
        assert_eq!(s.confirmations, 6);
        assert_eq!(s.block_height, Some(10));

        let s: TxStatus = serde_json::from_str(r#"{"valid":true,"height":7}"#).unwrap();
        assert!(s.confirmed);
        assert_eq!(s.block_height, Some(7));

        let s: TxStatus = serde_json::from_str(r#"{"blockheight":3,"confirmed":false}"#).unwrap();
        assert!(!s.confirmed);
        assert_eq!(s.confirmations, 0);
        assert_eq!(s.block_height, Some(3));
    }

    #[test]
    fn test_status_empty_document_is_unconfirmed() {
        let s: TxStatus = serde_json::from_str("{}").unwrap();
        assert!(!s.confirmed);
        assert_eq!(s.confirmations, 0);
        assert_eq!(s.block_height, None);
    }

    #[test]
    fn test_reject_classification() {
        assert_eq!(RejectReason::classify("258: txn-mempool-conflict"), RejectReason::MempoolConflict);
        assert_eq!(RejectReason::classify("Transaction already known"), RejectReason::AlreadyKnown);
        assert_eq!(RejectReason::classify("txn-already-in-mempool"), RejectReason::AlreadyInMempool);
        assert_eq!(RejectReason::classify("bad-txns-inputs-missingorspent"), RejectReason::AlreadySpent);
        assert_eq!(RejectReason::classify("min relay fee not met"), RejectReason::Other);
        assert!(!RejectReason::Other.is_retryable());
        assert!(RejectReason::AlreadySpent.is_retryable());
        assert!(RejectReason::AlreadyKnown.is_already_broadcast());
        assert!(RejectReason::AlreadyInMempool.is_already_broadcast());
        assert!(!RejectReason::MempoolConflict.is_already_broadcast());
    }

    #[test]
    fn test_error_retryability() {
        assert!(ProviderError::Timeout(500).is_retryable());
        assert!(ProviderError::Unavailable("503".into()).is_retryable());
        assert!(!ProviderError::Malformed("not json".into()).is_retryable());
        let err = ProviderError::Rejected {
            reason: RejectReason::Other,
            message: "scriptsig-not-pushonly".into(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("scriptsig-not-pushonly"));
    }

    #[test]
    fn test_txid_format() {
        assert!(is_valid_txid(&"ab".repeat(32)));
        assert!(!is_valid_txid(&"AB".repeat(32)));
        assert!(!is_valid_txid("abcd"));
        assert!(!is_valid_txid(&"zz".repeat(32)));
    }
}
