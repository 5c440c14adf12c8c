//! In-process store backed by `DashMap`.
//!
//! Shard-level locking in `entry` gives the same insert-or-ignore semantics
//! as a unique column. State does not survive restarts; use
//! [`SqliteStore`](crate::storage::SqliteStore) for that.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::idempotency::types::{IdempotencyRecord, LedgerStatus};
use crate::observability::metrics;
use crate::storage::{LedgerStore, StoreResult, TrackedTxStore};
use crate::tracking::types::TrackedTransaction;

/// A thread-safe in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<String, IdempotencyRecord>>,
    tracked: Arc<DashMap<String, TrackedTransaction>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ledger records.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Number of tracked transactions.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }
}

impl LedgerStore for MemoryStore {
    fn insert_record(&self, record: &IdempotencyRecord) -> StoreResult<bool> {
        let inserted = match self.records.entry(record.key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                true
            }
        };
        if inserted {
            metrics::record_ledger_size(self.records.len());
        }
        Ok(inserted)
    }

    fn fetch_record(&self, key: &str) -> StoreResult<Option<IdempotencyRecord>> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    fn finalize_record(
        &self,
        key: &str,
        status: LedgerStatus,
        payload: &str,
        attempt_count: u32,
        now: u64,
    ) -> StoreResult<bool> {
        match self.records.get_mut(key) {
            Some(mut record) if record.status == LedgerStatus::Pending => {
                record.status = status;
                record.result_payload = Some(payload.to_string());
                record.attempt_count = attempt_count;
                record.stored_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn purge_records(&self, cutoff: u64) -> StoreResult<usize> {
        let before = self.records.len();
        self.records
            .retain(|_, r| !(r.status.is_final() && r.stored_at < cutoff));
        let removed = before.saturating_sub(self.records.len());
        metrics::record_ledger_size(self.records.len());
        Ok(removed)
    }

    fn count_pending_before(&self, cutoff: u64) -> StoreResult<usize> {
        Ok(self
            .records
            .iter()
            .filter(|r| !r.status.is_final() && r.stored_at < cutoff)
            .count())
    }
}

impl TrackedTxStore for MemoryStore {
    fn insert_tracked(&self, tx: &TrackedTransaction) -> StoreResult<bool> {
        match self.tracked.entry(tx.txid.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(tx.clone());
                Ok(true)
            }
        }
    }

    fn fetch_tracked(&self, txid: &str) -> StoreResult<Option<TrackedTransaction>> {
        Ok(self.tracked.get(txid).map(|r| r.value().clone()))
    }

    fn due_tracked(&self, now: u64, limit: usize) -> StoreResult<Vec<TrackedTransaction>> {
        let mut due: Vec<TrackedTransaction> = self
            .tracked
            .iter()
            .filter(|r| {
                r.confirmed_at.is_none() && r.next_check_at.map(|t| t <= now).unwrap_or(false)
            })
            .map(|r| r.value().clone())
            .collect();
        due.sort_by(|a, b| {
            a.next_check_at
                .cmp(&b.next_check_at)
                .then_with(|| a.txid.cmp(&b.txid))
        });
        due.truncate(limit);
        Ok(due)
    }

    fn mark_confirmed(&self, txid: &str, now: u64) -> StoreResult<bool> {
        match self.tracked.get_mut(txid) {
            Some(mut row) if row.confirmed_at.is_none() => {
                row.confirmed_at = Some(now);
                row.last_check_at = Some(now);
                row.next_check_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn reschedule(
        &self,
        txid: &str,
        checked_at: u64,
        next_check_at: u64,
        check_count: u32,
    ) -> StoreResult<bool> {
        match self.tracked.get_mut(txid) {
            Some(mut row) if row.confirmed_at.is_none() => {
                row.last_check_at = Some(checked_at);
                row.next_check_at = Some(next_check_at);
                row.check_count = check_count;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txid(n: u8) -> String {
        format!("{:02x}", n).repeat(32)
    }

    #[test]
    fn test_record_insert_is_unique() {
        let store = MemoryStore::new();
        let first = IdempotencyRecord::pending("k1", "hash-a", 10);
        assert!(store.insert_record(&first).unwrap());

        let second = IdempotencyRecord::pending("k1", "hash-b", 11);
        assert!(!store.insert_record(&second).unwrap());

        let stored = store.fetch_record("k1").unwrap().unwrap();
        assert_eq!(stored.request_hash, "hash-a");
    }

    #[test]
    fn test_finalize_only_once() {
        let store = MemoryStore::new();
        store.insert_record(&IdempotencyRecord::pending("k", "h", 1)).unwrap();

        assert!(store.finalize_record("k", LedgerStatus::Confirmed, "{\"ok\":true}", 1, 2).unwrap());
        assert!(!store.finalize_record("k", LedgerStatus::Failed, "{\"ok\":false}", 3, 3).unwrap());

        let stored = store.fetch_record("k").unwrap().unwrap();
        assert_eq!(stored.status, LedgerStatus::Confirmed);
        assert_eq!(stored.result_payload.as_deref(), Some("{\"ok\":true}"));
        assert!(!store.finalize_record("missing", LedgerStatus::Failed, "", 0, 0).unwrap());
    }

    #[test]
    fn test_purge_keeps_pending() {
        let store = MemoryStore::new();
        store.insert_record(&IdempotencyRecord::pending("old-final", "h", 1)).unwrap();
        store.finalize_record("old-final", LedgerStatus::Failed, "{}", 0, 5).unwrap();
        store.insert_record(&IdempotencyRecord::pending("old-pending", "h", 1)).unwrap();
        store.insert_record(&IdempotencyRecord::pending("new-final", "h", 1)).unwrap();
        store.finalize_record("new-final", LedgerStatus::Confirmed, "{}", 1, 50).unwrap();

        assert_eq!(store.purge_records(10).unwrap(), 1);
        assert!(store.fetch_record("old-final").unwrap().is_none());
        assert!(store.fetch_record("old-pending").unwrap().is_some());
        assert!(store.fetch_record("new-final").unwrap().is_some());
    }

    #[test]
    fn test_due_rows_ordered_and_limited() {
        let store = MemoryStore::new();
        for (n, next) in [(1u8, 30u64), (2, 10), (3, 20), (4, 500)] {
            let mut row = TrackedTransaction::new(&txid(n), None, 0);
            row.next_check_at = Some(next);
            store.insert_tracked(&row).unwrap();
        }
        store.mark_confirmed(&txid(3), 5).unwrap();

        let due = store.due_tracked(100, 10).unwrap();
        let ids: Vec<_> = due.iter().map(|r| r.txid.clone()).collect();
        assert_eq!(ids, vec![txid(2), txid(1)]);

        assert_eq!(store.due_tracked(100, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_confirmation_is_monotonic() {
        let store = MemoryStore::new();
        store.insert_tracked(&TrackedTransaction::new(&txid(9), None, 0)).unwrap();

        assert!(store.mark_confirmed(&txid(9), 100).unwrap());
        assert!(!store.mark_confirmed(&txid(9), 200).unwrap());
        assert!(!store.reschedule(&txid(9), 300, 315, 1).unwrap());

        let row = store.fetch_tracked(&txid(9)).unwrap().unwrap();
        assert_eq!(row.confirmed_at, Some(100));
        assert_eq!(row.next_check_at, None);
    }
}
