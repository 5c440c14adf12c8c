//! The chain data provider contract consumed by the payout core.

use async_trait::async_trait;

use crate::chain::types::{BroadcastReceipt, ProviderResult, TxStatus, UnspentOutput};

/// Read/broadcast access to the chain.
///
/// Implementations must return [`ProviderError::Rejected`] with a typed
/// reason for broadcast refusals; callers never inspect message text.
///
/// [`ProviderError::Rejected`]: crate::chain::ProviderError::Rejected
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Spendable outputs locked to `address`.
    async fn fetch_address_utxos(&self, address: &str) -> ProviderResult<Vec<UnspentOutput>>;

    /// Submit a signed, hex-encoded transaction.
    async fn broadcast_raw_transaction(&self, raw_hex: &str) -> ProviderResult<BroadcastReceipt>;

    /// Confirmation state of `txid`.
    async fn query_tx_status(&self, txid: &str) -> ProviderResult<TxStatus>;
}
