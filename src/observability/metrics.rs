//! Metrics collection and exposition.
//!
//! # Metrics
//! - `payout_requests_total` (counter): funding requests by outcome
//! - `payout_broadcast_attempts_total` (counter): broadcast calls by result
//! - `payout_selected_inputs` (histogram): inputs per selection
//! - `payout_idempotent_replays_total` (counter): duplicate requests by replay kind
//! - `payout_idempotency_conflicts_total` (counter): key reuse with a different body
//! - `payout_ledger_records` (gauge): records held by the in-memory ledger
//! - `payout_poll_ticks_total` (counter): poller ticks by result
//! - `payout_poll_rows` (histogram): due rows per tick
//! - `payout_confirmations_total` (counter): transactions marked confirmed
//!
//! # Design Decisions
//! - Recorders are free functions so call sites stay one line
//! - Without an installed exporter every call is a no-op

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_payout_request(outcome: &'static str) {
    counter!("payout_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_broadcast_attempt(result: &'static str) {
    counter!("payout_broadcast_attempts_total", "result" => result).increment(1);
}

pub fn record_selected_inputs(count: usize) {
    histogram!("payout_selected_inputs").record(count as f64);
}

/// `final_result` is false when the duplicate hit a request still in flight.
pub fn record_idempotent_replay(final_result: bool) {
    let kind = if final_result { "replayed" } else { "in_flight" };
    counter!("payout_idempotent_replays_total", "kind" => kind).increment(1);
}

pub fn record_idempotency_conflict() {
    counter!("payout_idempotency_conflicts_total").increment(1);
}

/// Pending records older than the lease.
pub fn record_stale_pending(count: usize) {
    gauge!("payout_ledger_stale_pending").set(count as f64);
}

/// Broadcast payout whose confirmation row could not be written.
pub fn record_tracking_failure() {
    counter!("payout_tracking_failures_total").increment(1);
}

pub fn record_ledger_size(size: usize) {
    gauge!("payout_ledger_records").set(size as f64);
}

pub fn record_poll_tick(result: &'static str) {
    counter!("payout_poll_ticks_total", "result" => result).increment(1);
}

pub fn record_poll_rows(rows: usize) {
    histogram!("payout_poll_rows").record(rows as f64);
}

pub fn record_confirmation() {
    counter!("payout_confirmations_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_exporter_are_noops() {
        record_payout_request("broadcast");
        record_broadcast_attempt("accepted");
        record_selected_inputs(3);
        record_idempotent_replay(true);
        record_idempotency_conflict();
        record_ledger_size(10);
        record_stale_pending(1);
        record_tracking_failure();
        record_poll_tick("skipped");
        record_poll_rows(0);
        record_confirmation();
    }
}
