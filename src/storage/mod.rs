//! Durable state: the idempotency ledger table and the tracked-transaction
//! table.
//!
//! # Data Flow
//! ```text
//! IdempotencyLedger ──▶ LedgerStore      ─┐
//!                                          ├─▶ memory.rs (DashMap)
//! Orchestrator/Poller ─▶ TrackedTxStore  ─┘   sqlite.rs (rusqlite)
//! ```
//!
//! # Design Decisions
//! - Uniqueness of `key` and `txid` is enforced by the store, not by locks
//! - Every mutation is one atomic statement keyed by a unique column
//! - Conditional updates (`WHERE status = 'pending'`, `WHERE confirmed_at IS
//!   NULL`) make finalization and confirmation happen exactly once

pub mod memory;
pub mod sqlite;

use thiserror::Error;

use crate::error::PayoutError;
use crate::idempotency::types::{IdempotencyRecord, LedgerStatus};
use crate::tracking::types::TrackedTransaction;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<StoreError> for PayoutError {
    fn from(e: StoreError) -> Self {
        PayoutError::InternalInconsistency(format!("storage failure: {}", e))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-unique command store behind the idempotency ledger.
pub trait LedgerStore: Send + Sync {
    /// Insert unless `record.key` exists. Returns `true` if inserted.
    fn insert_record(&self, record: &IdempotencyRecord) -> StoreResult<bool>;

    fn fetch_record(&self, key: &str) -> StoreResult<Option<IdempotencyRecord>>;

    /// Store the result of a pending record. Returns `false` if the record is
    /// missing or already final.
    fn finalize_record(
        &self,
        key: &str,
        status: LedgerStatus,
        payload: &str,
        attempt_count: u32,
        now: u64,
    ) -> StoreResult<bool>;

    /// Delete final records last written before `cutoff`. Pending records
    /// are kept.
    fn purge_records(&self, cutoff: u64) -> StoreResult<usize>;

    /// Count pending records claimed before `cutoff`.
    fn count_pending_before(&self, cutoff: u64) -> StoreResult<usize>;
}

/// Txid-unique table of broadcast transactions.
pub trait TrackedTxStore: Send + Sync {
    /// Insert unless `tx.txid` exists. Returns `true` if inserted.
    fn insert_tracked(&self, tx: &TrackedTransaction) -> StoreResult<bool>;

    fn fetch_tracked(&self, txid: &str) -> StoreResult<Option<TrackedTransaction>>;

    /// Unconfirmed rows with `next_check_at <= now`, earliest first.
    fn due_tracked(&self, now: u64, limit: usize) -> StoreResult<Vec<TrackedTransaction>>;

    /// Set `confirmed_at` if still null. Returns `true` if this call set it.
    fn mark_confirmed(&self, txid: &str, now: u64) -> StoreResult<bool>;

    /// Record an unsuccessful check on an unconfirmed row.
    fn reschedule(
        &self,
        txid: &str,
        checked_at: u64,
        next_check_at: u64,
        check_count: u32,
    ) -> StoreResult<bool>;
}
