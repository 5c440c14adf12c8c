//! Pool payout core: UTXO selection, idempotent broadcast, confirmation
//! tracking.

pub mod assembly;
pub mod broadcast;
pub mod chain;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod selection;
pub mod storage;
pub mod tracking;

pub use broadcast::{BroadcastOrchestrator, FundingRequest, PayoutResponse};
pub use config::schema::PayoutConfig;
pub use error::{ErrorKind, PayoutError, PayoutResult};
pub use lifecycle::Shutdown;
pub use tracking::ConfirmationPoller;

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
