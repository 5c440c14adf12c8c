//! Idempotency ledger: at-most-once execution per client key.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::{PayoutError, PayoutResult};
use crate::idempotency::types::{BeginOutcome, IdempotencyRecord, LedgerStatus};
use crate::observability::metrics;
use crate::storage::LedgerStore;

/// Longest idempotency key accepted.
pub const MAX_KEY_LEN: usize = 128;

/// Hex SHA-256 digest of an already-normalized request body.
pub fn hash_request(normalized: &[u8]) -> String {
    hex::encode(Sha256::digest(normalized))
}

/// Default time a pending record may stay unfinished before it is stale.
pub const DEFAULT_PENDING_LEASE: Duration = Duration::from_secs(15 * 60);

/// Ledger over an injected key-unique store.
#[derive(Clone)]
pub struct IdempotencyLedger {
    store: Arc<dyn LedgerStore>,
    ttl: Duration,
    pending_lease: Duration,
}

impl IdempotencyLedger {
    pub fn new(store: Arc<dyn LedgerStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            pending_lease: DEFAULT_PENDING_LEASE,
        }
    }

    pub fn with_pending_lease(mut self, lease: Duration) -> Self {
        self.pending_lease = lease;
        self
    }

    fn is_stale(&self, record: &IdempotencyRecord, now: u64) -> bool {
        !record.status.is_final()
            && now.saturating_sub(record.stored_at) > self.pending_lease.as_secs()
    }

    fn validate_key(key: &str) -> PayoutResult<()> {
        if key.trim().is_empty() {
            return Err(PayoutError::InvalidRequest("idempotency key is required".to_string()));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(PayoutError::InvalidRequest(format!(
                "idempotency key longer than {} bytes",
                MAX_KEY_LEN
            )));
        }
        Ok(())
    }

    /// Claim `key` for `request_hash`.
    ///
    /// The first caller gets `is_new = true` and must run the command, then
    /// call [`complete`](Self::complete). Later callers with the same hash get
    /// the stored result (or `None` while the first is still in flight, with
    /// `stale` set once the pending record outlives the lease). A different
    /// hash is an `IdempotencyConflict`.
    pub fn begin(&self, key: &str, request_hash: &str, now: u64) -> PayoutResult<BeginOutcome> {
        Self::validate_key(key)?;

        let record = IdempotencyRecord::pending(key, request_hash, now);
        if self.store.insert_record(&record)? {
            tracing::debug!(key = %key, "Idempotency key claimed");
            return Ok(BeginOutcome {
                is_new: true,
                prior_result: None,
                stale: false,
            });
        }

        // Lost the insert: somebody owns this key.
        let existing = self.store.fetch_record(key)?.ok_or_else(|| {
            PayoutError::InternalInconsistency(format!("idempotency record '{}' vanished", key))
        })?;

        if existing.request_hash != request_hash {
            tracing::warn!(key = %key, "Idempotency key reused with a different request");
            metrics::record_idempotency_conflict();
            return Err(PayoutError::IdempotencyConflict {
                key: key.to_string(),
                detail: "key already bound to a different request".to_string(),
            });
        }

        metrics::record_idempotent_replay(existing.status.is_final());
        let stale = self.is_stale(&existing, now);
        if stale {
            tracing::warn!(key = %key, claimed_at = existing.stored_at, "Pending idempotency record outlived its lease");
        }
        Ok(BeginOutcome {
            is_new: false,
            prior_result: existing.result_payload.filter(|_| existing.status.is_final()),
            stale,
        })
    }

    /// Store the outcome for `key`. Only the first completion is kept.
    pub fn complete(
        &self,
        key: &str,
        status: LedgerStatus,
        result_payload: &str,
        attempt_count: u32,
        now: u64,
    ) -> PayoutResult<()> {
        if !status.is_final() {
            return Err(PayoutError::InternalInconsistency(
                "cannot complete a command as pending".to_string(),
            ));
        }

        if self
            .store
            .finalize_record(key, status, result_payload, attempt_count, now)?
        {
            tracing::debug!(key = %key, status = status.as_db_str(), attempt_count, "Idempotency record finalized");
            Ok(())
        } else {
            Err(PayoutError::InternalInconsistency(format!(
                "idempotency record '{}' missing or already completed",
                key
            )))
        }
    }

    /// Look up the record for `key`.
    pub fn get(&self, key: &str) -> PayoutResult<Option<IdempotencyRecord>> {
        Ok(self.store.fetch_record(key)?)
    }

    /// Number of pending records older than the lease.
    pub fn count_stale(&self, now: u64) -> PayoutResult<usize> {
        let cutoff = now.saturating_sub(self.pending_lease.as_secs());
        let stale = self.store.count_pending_before(cutoff)?;
        metrics::record_stale_pending(stale);
        Ok(stale)
    }

    /// Evict finalized records older than the TTL.
    pub fn purge_expired(&self, now: u64) -> PayoutResult<usize> {
        let cutoff = now.saturating_sub(self.ttl.as_secs());
        let removed = self.store.purge_records(cutoff)?;
        if removed > 0 {
            tracing::info!(removed, cutoff, "Purged expired idempotency records");
        }
        Ok(removed)
    }
}
