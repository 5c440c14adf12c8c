//! Confirmation polling.
//!
//! # Responsibilities
//! - Periodically check due, unconfirmed transactions
//! - Mark confirmations exactly once
//! - Push unconfirmed rows down the backoff ladder

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::chain::{is_valid_txid, ChainProvider, TxStatus};
use crate::config::PollerConfig;
use crate::error::{PayoutError, PayoutResult};
use crate::observability::metrics;
use crate::resilience::with_deadline;
use crate::storage::TrackedTxStore;
use crate::tracking::types::{ladder_delay_secs, TickSummary, TrackedTransaction};
use crate::unix_now;

/// Stored row plus what the provider just reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub tracked: TrackedTransaction,
    pub chain: TxStatus,
}

enum RowOutcome {
    Confirmed,
    Rescheduled,
    /// Another writer got there first.
    Unchanged,
    Failed,
}

/// Clears the in-progress flag when a tick ends, however it ends.
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ConfirmationPoller {
    provider: Arc<dyn ChainProvider>,
    store: Arc<dyn TrackedTxStore>,
    config: PollerConfig,
    ticking: AtomicBool,
}

impl ConfirmationPoller {
    pub fn new(
        provider: Arc<dyn ChainProvider>,
        store: Arc<dyn TrackedTxStore>,
        config: PollerConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
            ticking: AtomicBool::new(false),
        }
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Confirmation poller disabled");
            return;
        }

        tracing::info!(
            interval_ms = self.config.interval_ms,
            batch_size = self.config.batch_size,
            zero_conf = self.config.zero_conf,
            "Confirmation poller starting"
        );

        let mut ticker = time::interval(Duration::from_millis(self.config.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(summary) = self.tick_at(unix_now()).await {
                        if summary.scanned > 0 {
                            tracing::info!(
                                scanned = summary.scanned,
                                confirmed = summary.confirmed,
                                rescheduled = summary.rescheduled,
                                failed = summary.failed,
                                "Poll tick complete"
                            );
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Confirmation poller received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one tick as of `now`. Returns `None` if a tick is already running.
    pub async fn tick_at(&self, now: u64) -> Option<TickSummary> {
        let Some(_guard) = TickGuard::acquire(&self.ticking) else {
            tracing::debug!("Previous poll tick still running, skipping");
            metrics::record_poll_tick("skipped");
            return None;
        };

        let due = match self.store.due_tracked(now, self.config.batch_size) {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load due transactions");
                metrics::record_poll_tick("error");
                return Some(TickSummary::default());
            }
        };
        metrics::record_poll_rows(due.len());

        let outcomes: Vec<RowOutcome> = stream::iter(due)
            .map(|row| self.check_row(row, now))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut summary = TickSummary {
            scanned: outcomes.len(),
            ..TickSummary::default()
        };
        for outcome in outcomes {
            match outcome {
                RowOutcome::Confirmed => summary.confirmed += 1,
                RowOutcome::Rescheduled => summary.rescheduled += 1,
                RowOutcome::Failed => summary.failed += 1,
                RowOutcome::Unchanged => {}
            }
        }
        metrics::record_poll_tick("completed");
        Some(summary)
    }

    async fn check_row(&self, row: TrackedTransaction, now: u64) -> RowOutcome {
        let confirmed = match self.query(&row.txid).await {
            Ok(status) => self.counts_as_confirmed(&status),
            Err(e) => {
                tracing::warn!(txid = %row.txid, error = %e, "Status query failed");
                false
            }
        };

        if confirmed {
            return match self.store.mark_confirmed(&row.txid, now) {
                Ok(true) => {
                    tracing::info!(txid = %row.txid, checks = row.check_count + 1, "Transaction confirmed");
                    metrics::record_confirmation();
                    RowOutcome::Confirmed
                }
                Ok(false) => RowOutcome::Unchanged,
                Err(e) => {
                    tracing::error!(txid = %row.txid, error = %e, "Failed to mark transaction confirmed");
                    RowOutcome::Failed
                }
            };
        }

        let check_count = row.check_count.saturating_add(1);
        let next_check_at = now + ladder_delay_secs(check_count);
        match self.store.reschedule(&row.txid, now, next_check_at, check_count) {
            Ok(true) => {
                tracing::debug!(txid = %row.txid, check_count, next_check_at, "Rescheduled status check");
                RowOutcome::Rescheduled
            }
            Ok(false) => RowOutcome::Unchanged,
            Err(e) => {
                tracing::error!(txid = %row.txid, error = %e, "Failed to reschedule status check");
                RowOutcome::Failed
            }
        }
    }

    /// Direct status query for one tracked transaction. Marks it confirmed
    /// if the provider says so.
    pub async fn refresh(&self, txid: &str, now: u64) -> PayoutResult<StatusReport> {
        if !is_valid_txid(txid) {
            return Err(PayoutError::InvalidRequest(format!(
                "'{}' is not a 64-character lowercase hex txid",
                txid
            )));
        }
        let tracked = self
            .store
            .fetch_tracked(txid)?
            .ok_or_else(|| PayoutError::InvalidRequest(format!("transaction {} is not tracked", txid)))?;

        let chain = self
            .query(txid)
            .await
            .map_err(|e| PayoutError::ProviderUnavailable(e.to_string()))?;

        if tracked.is_confirmed() || !self.counts_as_confirmed(&chain) {
            return Ok(StatusReport { tracked, chain });
        }

        if self.store.mark_confirmed(txid, now)? {
            tracing::info!(txid = %txid, "Transaction confirmed on refresh");
            metrics::record_confirmation();
        }
        let tracked = self.store.fetch_tracked(txid)?.ok_or_else(|| {
            PayoutError::InternalInconsistency(format!("tracked transaction {} vanished", txid))
        })?;
        Ok(StatusReport { tracked, chain })
    }

    async fn query(&self, txid: &str) -> crate::chain::ProviderResult<TxStatus> {
        with_deadline(
            Duration::from_millis(self.config.provider_timeout_ms),
            self.provider.query_tx_status(txid),
        )
        .await
    }

    fn counts_as_confirmed(&self, status: &TxStatus) -> bool {
        status.confirmed || self.config.zero_conf
    }
}
