//! SQLite-backed store. Uniqueness lives in the schema, so duplicate
//! submissions stay deduplicated across process restarts.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::idempotency::types::{IdempotencyRecord, LedgerStatus};
use crate::storage::{LedgerStore, StoreError, StoreResult, TrackedTxStore};
use crate::tracking::types::TrackedTransaction;

/// Store over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn to_sql_int(v: u64) -> StoreResult<i64> {
    i64::try_from(v).map_err(|_| StoreError::InvalidData(format!("value {} exceeds i64", v)))
}

fn from_sql_int(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "Opening payout database");
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS idempotency_records (
                 key TEXT PRIMARY KEY NOT NULL,
                 request_hash TEXT NOT NULL,
                 status TEXT NOT NULL,
                 result_payload TEXT,
                 attempt_count INTEGER NOT NULL DEFAULT 0,
                 stored_at INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS tracked_transactions (
                 txid TEXT PRIMARY KEY NOT NULL CHECK (length(txid) = 64),
                 pool_ref TEXT,
                 created_at INTEGER NOT NULL,
                 confirmed_at INTEGER,
                 last_check_at INTEGER,
                 next_check_at INTEGER,
                 check_count INTEGER NOT NULL DEFAULT 0
             );
             CREATE INDEX IF NOT EXISTS idx_tracked_due
                 ON tracked_transactions (next_check_at)
                 WHERE confirmed_at IS NULL;",
        )?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(IdempotencyRecord, String)> {
        let status: String = row.get(2)?;
        let record = IdempotencyRecord {
            key: row.get(0)?,
            request_hash: row.get(1)?,
            status: LedgerStatus::Pending,
            result_payload: row.get(3)?,
            attempt_count: u32::try_from(row.get::<_, i64>(4)?).unwrap_or(0),
            stored_at: from_sql_int(row.get(5)?),
        };
        Ok((record, status))
    }

    fn tracked_from_row(row: &Row<'_>) -> rusqlite::Result<TrackedTransaction> {
        Ok(TrackedTransaction {
            txid: row.get(0)?,
            pool_ref: row.get(1)?,
            created_at: from_sql_int(row.get(2)?),
            confirmed_at: row.get::<_, Option<i64>>(3)?.map(from_sql_int),
            last_check_at: row.get::<_, Option<i64>>(4)?.map(from_sql_int),
            next_check_at: row.get::<_, Option<i64>>(5)?.map(from_sql_int),
            check_count: u32::try_from(row.get::<_, i64>(6)?).unwrap_or(0),
        })
    }
}

impl LedgerStore for SqliteStore {
    fn insert_record(&self, record: &IdempotencyRecord) -> StoreResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO idempotency_records
                 (key, request_hash, status, result_payload, attempt_count, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.key,
                record.request_hash,
                record.status.as_db_str(),
                record.result_payload,
                record.attempt_count,
                to_sql_int(record.stored_at)?,
            ],
        )?;
        Ok(changed == 1)
    }

    fn fetch_record(&self, key: &str) -> StoreResult<Option<IdempotencyRecord>> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT key, request_hash, status, result_payload, attempt_count, stored_at
                 FROM idempotency_records WHERE key = ?1",
                params![key],
                Self::record_from_row,
            )
            .optional()?;

        match found {
            Some((mut record, status)) => {
                record.status = LedgerStatus::from_db_str(&status).ok_or_else(|| {
                    StoreError::InvalidData(format!("Invalid ledger status: {}", status))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn finalize_record(
        &self,
        key: &str,
        status: LedgerStatus,
        payload: &str,
        attempt_count: u32,
        now: u64,
    ) -> StoreResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE idempotency_records
             SET status = ?2, result_payload = ?3, attempt_count = ?4, stored_at = ?5
             WHERE key = ?1 AND status = 'pending'",
            params![key, status.as_db_str(), payload, attempt_count, to_sql_int(now)?],
        )?;
        Ok(changed == 1)
    }

    fn purge_records(&self, cutoff: u64) -> StoreResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM idempotency_records WHERE status != 'pending' AND stored_at < ?1",
            params![to_sql_int(cutoff)?],
        )?;
        Ok(removed)
    }

    fn count_pending_before(&self, cutoff: u64) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM idempotency_records WHERE status = 'pending' AND stored_at < ?1",
            params![to_sql_int(cutoff)?],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl TrackedTxStore for SqliteStore {
    fn insert_tracked(&self, tx: &TrackedTransaction) -> StoreResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO tracked_transactions
                 (txid, pool_ref, created_at, confirmed_at, last_check_at, next_check_at, check_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                tx.txid,
                tx.pool_ref,
                to_sql_int(tx.created_at)?,
                tx.confirmed_at.map(to_sql_int).transpose()?,
                tx.last_check_at.map(to_sql_int).transpose()?,
                tx.next_check_at.map(to_sql_int).transpose()?,
                tx.check_count,
            ],
        )?;
        Ok(changed == 1)
    }

    fn fetch_tracked(&self, txid: &str) -> StoreResult<Option<TrackedTransaction>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT txid, pool_ref, created_at, confirmed_at, last_check_at, next_check_at, check_count
                 FROM tracked_transactions WHERE txid = ?1",
                params![txid],
                Self::tracked_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn due_tracked(&self, now: u64, limit: usize) -> StoreResult<Vec<TrackedTransaction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT txid, pool_ref, created_at, confirmed_at, last_check_at, next_check_at, check_count
             FROM tracked_transactions
             WHERE confirmed_at IS NULL AND next_check_at IS NOT NULL AND next_check_at <= ?1
             ORDER BY next_check_at ASC, txid ASC
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![to_sql_int(now)?, limit], Self::tracked_from_row)?;

        let mut due = Vec::new();
        for row in rows {
            due.push(row?);
        }
        Ok(due)
    }

    fn mark_confirmed(&self, txid: &str, now: u64) -> StoreResult<bool> {
        let conn = self.lock()?;
        let now = to_sql_int(now)?;
        let changed = conn.execute(
            "UPDATE tracked_transactions
             SET confirmed_at = ?2, last_check_at = ?2, next_check_at = NULL
             WHERE txid = ?1 AND confirmed_at IS NULL",
            params![txid, now],
        )?;
        Ok(changed == 1)
    }

    fn reschedule(
        &self,
        txid: &str,
        checked_at: u64,
        next_check_at: u64,
        check_count: u32,
    ) -> StoreResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE tracked_transactions
             SET last_check_at = ?2, next_check_at = ?3, check_count = ?4
             WHERE txid = ?1 AND confirmed_at IS NULL",
            params![txid, to_sql_int(checked_at)?, to_sql_int(next_check_at)?, check_count],
        )?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txid(n: u8) -> String {
        format!("{:02x}", n).repeat(32)
    }

    #[test]
    fn test_record_roundtrip_and_uniqueness() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.insert_record(&IdempotencyRecord::pending("k", "h1", 7)).unwrap());
        assert!(!store.insert_record(&IdempotencyRecord::pending("k", "h2", 8)).unwrap());

        let rec = store.fetch_record("k").unwrap().unwrap();
        assert_eq!(rec.request_hash, "h1");
        assert_eq!(rec.status, LedgerStatus::Pending);
        assert_eq!(rec.stored_at, 7);

        assert!(store.finalize_record("k", LedgerStatus::Failed, "{\"ok\":false}", 3, 9).unwrap());
        assert!(!store.finalize_record("k", LedgerStatus::Confirmed, "{\"ok\":true}", 1, 10).unwrap());

        let rec = store.fetch_record("k").unwrap().unwrap();
        assert_eq!(rec.status, LedgerStatus::Failed);
        assert_eq!(rec.attempt_count, 3);
        assert_eq!(rec.result_payload.as_deref(), Some("{\"ok\":false}"));
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payout.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_record(&IdempotencyRecord::pending("k", "h", 1)).unwrap();
            store.insert_tracked(&TrackedTransaction::new(&txid(1), Some("pool-7".into()), 5)).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(!store.insert_record(&IdempotencyRecord::pending("k", "h", 2)).unwrap());
        let row = store.fetch_tracked(&txid(1)).unwrap().unwrap();
        assert_eq!(row.pool_ref.as_deref(), Some("pool-7"));
        assert_eq!(row.next_check_at, Some(5));
    }

    #[test]
    fn test_tracked_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_tracked(&TrackedTransaction::new(&txid(1), None, 100)).unwrap();
        store.insert_tracked(&TrackedTransaction::new(&txid(2), None, 50)).unwrap();
        assert!(!store.insert_tracked(&TrackedTransaction::new(&txid(1), None, 999)).unwrap());

        let due = store.due_tracked(100, 10).unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].txid, txid(2));

        assert!(store.reschedule(&txid(2), 100, 115, 1).unwrap());
        assert_eq!(store.due_tracked(100, 10).unwrap().len(), 1);

        assert!(store.mark_confirmed(&txid(1), 120).unwrap());
        assert!(!store.mark_confirmed(&txid(1), 130).unwrap());
        let row = store.fetch_tracked(&txid(1)).unwrap().unwrap();
        assert_eq!(row.confirmed_at, Some(120));
        assert_eq!(row.next_check_at, None);

        let row = store.fetch_tracked(&txid(2)).unwrap().unwrap();
        assert_eq!(row.check_count, 1);
        assert_eq!(row.last_check_at, Some(100));
    }

    #[test]
    fn test_rejects_malformed_txid() {
        let store = SqliteStore::open_in_memory().unwrap();
        let row = TrackedTransaction::new("short", None, 1);
        // OR IGNORE also swallows CHECK violations; the row must not land.
        assert!(!store.insert_tracked(&row).unwrap());
        assert!(store.fetch_tracked("short").unwrap().is_none());
    }

    #[test]
    fn test_purge() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_record(&IdempotencyRecord::pending("a", "h", 1)).unwrap();
        store.finalize_record("a", LedgerStatus::Confirmed, "{}", 1, 2).unwrap();
        store.insert_record(&IdempotencyRecord::pending("b", "h", 1)).unwrap();

        assert_eq!(store.purge_records(100).unwrap(), 1);
        assert!(store.fetch_record("b").unwrap().is_some());
        assert_eq!(store.count_pending_before(100).unwrap(), 1);
        assert_eq!(store.count_pending_before(1).unwrap(), 0);
    }
}
