//! Chain data provider subsystem.
//!
//! # Data Flow
//! ```text
//! Broadcast orchestrator / confirmation poller
//!     → provider.rs (ChainProvider trait)
//!     → client.rs (explorer REST calls with timeouts + failover)
//!     → types.rs (UTXO snapshots, receipts, tolerant status decoding)
//! ```
//!
//! # Design Decisions
//! - The core depends on the trait only; tests supply in-process providers
//! - Upstream rejections are classified once, here, into typed reasons
//! - Every call has a deadline; a timeout is a transient failure

pub mod client;
pub mod provider;
pub mod types;

pub use client::ExplorerClient;
pub use provider::ChainProvider;
pub use types::{
    is_valid_txid, BroadcastReceipt, ProviderError, ProviderResult, RejectReason, TxStatus,
    UnspentOutput,
};
