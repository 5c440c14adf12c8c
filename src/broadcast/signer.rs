//! Signing seam. Key material never enters this crate.

use async_trait::async_trait;
use thiserror::Error;

use crate::assembly::UnsignedTransaction;
use crate::error::PayoutError;

/// A signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Hex-encoded serialized transaction.
    pub raw_hex: String,
    /// Txid of `raw_hex`, as the signer computed it.
    pub txid: String,
}

#[derive(Debug, Clone, Error)]
pub enum SignerError {
    /// The signer refused the transaction.
    #[error("Signer rejected transaction: {0}")]
    Rejected(String),

    /// The signer could not be reached.
    #[error("Signer unavailable: {0}")]
    Unavailable(String),
}

impl From<SignerError> for PayoutError {
    fn from(e: SignerError) -> Self {
        PayoutError::SigningFailed(e.to_string())
    }
}

/// External signer (HSM, wallet daemon, remote service).
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction, SignerError>;
}
