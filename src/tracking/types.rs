//! Confirmation tracking types.

use serde::{Deserialize, Serialize};

/// Re-check delays in seconds, indexed by check count and capped at the last
/// entry.
pub const BACKOFF_LADDER_SECS: [u64; 9] = [0, 15, 30, 60, 120, 240, 480, 960, 1800];

/// Delay before the next check after `check_count` unsuccessful checks.
pub fn ladder_delay_secs(check_count: u32) -> u64 {
    let idx = (check_count as usize).min(BACKOFF_LADDER_SECS.len() - 1);
    BACKOFF_LADDER_SECS[idx]
}

/// A broadcast transaction awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedTransaction {
    /// 64 lowercase hex chars.
    pub txid: String,
    /// Pool/account the payout belongs to.
    pub pool_ref: Option<String>,
    pub created_at: u64,
    /// Set exactly once.
    pub confirmed_at: Option<u64>,
    pub last_check_at: Option<u64>,
    /// Cleared on confirmation.
    pub next_check_at: Option<u64>,
    pub check_count: u32,
}

impl TrackedTransaction {
    /// New row for a freshly broadcast transaction, due immediately.
    pub fn new(txid: &str, pool_ref: Option<String>, now: u64) -> Self {
        Self {
            txid: txid.to_string(),
            pool_ref,
            created_at: now,
            confirmed_at: None,
            last_check_at: None,
            next_check_at: Some(now + ladder_delay_secs(0)),
            check_count: 0,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }
}

/// Counts from one poller tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub scanned: usize,
    pub confirmed: usize,
    pub rescheduled: usize,
    /// Rows whose store update failed.
    pub failed: usize,
}
