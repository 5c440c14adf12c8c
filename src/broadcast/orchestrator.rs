//! Idempotent payout pipeline.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::assembly::assemble_transaction;
use crate::broadcast::request::FundingRequest;
use crate::broadcast::response::PayoutResponse;
use crate::broadcast::signer::{SignedTransaction, TransactionSigner};
use crate::chain::{is_valid_txid, BroadcastReceipt, ChainProvider, ProviderError};
use crate::config::PayoutConfig;
use crate::error::{ErrorKind, PayoutError, PayoutResult};
use crate::idempotency::{IdempotencyLedger, LedgerStatus};
use crate::observability::metrics;
use crate::resilience::{with_deadline, RetryPolicy};
use crate::selection::{select_utxos, SelectionOptions};
use crate::storage::TrackedTxStore;
use crate::tracking::TrackedTransaction;
use crate::unix_now;

/// Pipeline stage, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutStage {
    Selecting,
    Assembling,
    Signing,
    Broadcasting,
    Submitted,
    Failed,
}

impl PayoutStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PayoutStage::Selecting => "selecting",
            PayoutStage::Assembling => "assembling",
            PayoutStage::Signing => "signing",
            PayoutStage::Broadcasting => "broadcasting",
            PayoutStage::Submitted => "submitted",
            PayoutStage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PayoutStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one `submit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutOutcome {
    pub response: PayoutResponse,
    /// Exact JSON bound to the idempotency key.
    pub payload: String,
    /// True when the payload came from an earlier execution.
    pub replayed: bool,
}

/// What one execution produced, before it is written to the ledger.
struct Execution {
    result: PayoutResult<Submitted>,
    attempt_count: u32,
    input_count: Option<usize>,
}

struct Submitted {
    receipt: BroadcastReceipt,
    fee_sats: u64,
    change_sats: u64,
    input_count: usize,
    output_count: usize,
}

/// Runs funding requests through select, assemble, sign and broadcast with
/// at-most-once execution per idempotency key.
#[derive(Clone)]
pub struct BroadcastOrchestrator {
    provider: Arc<dyn ChainProvider>,
    signer: Arc<dyn TransactionSigner>,
    ledger: IdempotencyLedger,
    tracked: Arc<dyn TrackedTxStore>,
    retry: RetryPolicy,
    selection: SelectionOptions,
    provider_timeout: Duration,
}

impl BroadcastOrchestrator {
    pub fn new(
        provider: Arc<dyn ChainProvider>,
        signer: Arc<dyn TransactionSigner>,
        ledger: IdempotencyLedger,
        tracked: Arc<dyn TrackedTxStore>,
    ) -> Self {
        Self {
            provider,
            signer,
            ledger,
            tracked,
            retry: RetryPolicy::default(),
            selection: SelectionOptions::default(),
            provider_timeout: Duration::from_secs(10),
        }
    }

    /// Apply retry, selection and timeout settings from config.
    pub fn with_config(self, config: &PayoutConfig) -> Self {
        self.with_retry_policy(RetryPolicy::from(&config.broadcast))
            .with_selection(config.selection.options())
            .with_provider_timeout(Duration::from_millis(config.provider.timeout_ms))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_selection(mut self, selection: SelectionOptions) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Parse a JSON body and submit it.
    pub async fn submit_json(&self, idempotency_key: &str, body: &str) -> PayoutResult<PayoutOutcome> {
        let request = FundingRequest::from_json(body)?;
        self.submit(idempotency_key, &request).await
    }

    /// Execute `request` at most once for `idempotency_key`.
    ///
    /// Pipeline failures come back as `Ok` with `ok: false` and are stored
    /// under the key. `Err` is reserved for failures that leave nothing
    /// stored: invalid requests, key conflicts, a duplicate still in flight,
    /// storage faults.
    pub async fn submit(
        &self,
        idempotency_key: &str,
        request: &FundingRequest,
    ) -> PayoutResult<PayoutOutcome> {
        let span = tracing::info_span!(
            "payout",
            request_id = %Uuid::new_v4(),
            key = %idempotency_key,
        );
        let result = self.submit_inner(idempotency_key, request).instrument(span).await;
        if let Err(e) = &result {
            let outcome = match e.kind() {
                ErrorKind::IdempotencyConflict => "conflict",
                ErrorKind::InvalidRequest => "invalid",
                _ => "error",
            };
            metrics::record_payout_request(outcome);
        }
        result
    }

    async fn submit_inner(
        &self,
        key: &str,
        request: &FundingRequest,
    ) -> PayoutResult<PayoutOutcome> {
        request.validate()?;
        let request = request.normalized();
        let request_hash = request.request_hash()?;

        let begin = self.ledger.begin(key, &request_hash, unix_now())?;
        if !begin.is_new {
            return match begin.prior_result {
                Some(payload) => {
                    tracing::info!("Replaying stored result");
                    metrics::record_payout_request("replayed");
                    Ok(PayoutOutcome {
                        response: PayoutResponse::from_json(&payload)?,
                        payload,
                        replayed: true,
                    })
                }
                None if begin.stale => {
                    tracing::warn!("Claimed request never completed; outcome unknown");
                    Err(PayoutError::IdempotencyConflict {
                        key: key.to_string(),
                        detail: "request with this key was interrupted; its outcome is unknown and must be reconciled"
                            .to_string(),
                    })
                }
                None => Err(PayoutError::IdempotencyConflict {
                    key: key.to_string(),
                    detail: "request with this key is still in flight".to_string(),
                }),
            };
        }

        // Detached: dropping the caller's future must not strand the key as pending.
        let this = self.clone();
        let claimed_key = key.to_string();
        let task = tokio::spawn(
            async move { this.run_claimed(&claimed_key, request).await }
                .instrument(tracing::Span::current()),
        );
        task.await.map_err(|e| {
            PayoutError::InternalInconsistency(format!("payout task aborted: {}", e))
        })?
    }

    /// Execute a request whose key this caller owns and finalize the key.
    async fn run_claimed(&self, key: &str, request: FundingRequest) -> PayoutResult<PayoutOutcome> {
        let execution = self.execute(&request).await;

        let (response, status) = match &execution.result {
            Ok(sub) => {
                let tracked = self.track(&sub.receipt.txid, request.pool_ref.clone());
                stage(PayoutStage::Submitted);
                tracing::info!(
                    txid = %sub.receipt.txid,
                    fee_sats = sub.fee_sats,
                    change_sats = sub.change_sats,
                    attempts = execution.attempt_count,
                    already_known = sub.receipt.already_known,
                    "Payout broadcast"
                );
                metrics::record_payout_request("submitted");
                let mut response = PayoutResponse::submitted(
                    sub.receipt.txid.clone(),
                    sub.fee_sats,
                    sub.change_sats,
                    sub.input_count,
                    sub.output_count,
                    execution.attempt_count,
                );
                response.tracking_failed = !tracked;
                (response, LedgerStatus::Confirmed)
            }
            Err(e) => {
                stage(PayoutStage::Failed);
                tracing::warn!(
                    error = %e,
                    kind = %e.kind(),
                    attempts = execution.attempt_count,
                    "Payout failed"
                );
                metrics::record_payout_request("failed");
                (
                    PayoutResponse::failed(
                        e,
                        execution.attempt_count,
                        execution.input_count,
                        request.amount_sats,
                    ),
                    LedgerStatus::Failed,
                )
            }
        };

        let payload = response.to_json()?;
        if let Err(e) = self
            .ledger
            .complete(key, status, &payload, execution.attempt_count, unix_now())
        {
            let Some(txid) = &response.txid else {
                return Err(e);
            };
            tracing::error!(txid = %txid, payload = %payload, error = %e, "Broadcast payout could not be recorded");
            return Err(PayoutError::InternalInconsistency(format!(
                "payout broadcast as {} but its result could not be stored: {}",
                txid, e
            )));
        }

        Ok(PayoutOutcome {
            response,
            payload,
            replayed: false,
        })
    }

    async fn execute(&self, request: &FundingRequest) -> Execution {
        let mut input_count = None;
        let mut attempt_count = 0;
        let result = self
            .execute_stages(request, &mut input_count, &mut attempt_count)
            .await;
        Execution {
            result,
            attempt_count,
            input_count,
        }
    }

    async fn execute_stages(
        &self,
        request: &FundingRequest,
        input_count: &mut Option<usize>,
        attempt_count: &mut u32,
    ) -> PayoutResult<Submitted> {
        stage(PayoutStage::Selecting);
        let utxos = with_deadline(
            self.provider_timeout,
            self.provider.fetch_address_utxos(&request.source_address),
        )
        .await
        .map_err(|e| PayoutError::ProviderUnavailable(e.to_string()))?;

        let selection = select_utxos(
            &utxos,
            request.amount_sats,
            request.fee_rate_sats_per_byte,
            &self.selection,
        )?;
        *input_count = Some(selection.input_count());
        metrics::record_selected_inputs(selection.input_count());
        tracing::debug!(
            available = utxos.len(),
            inputs = selection.input_count(),
            fee_sats = selection.fee_sats,
            change_sats = selection.change_sats,
            change_is_dust = selection.change_is_dust,
            "Inputs selected"
        );

        stage(PayoutStage::Assembling);
        let tx = assemble_transaction(
            &selection,
            &request.destination_address,
            request.amount_sats,
            &request.source_address,
            self.selection.dust_threshold,
        )?;

        stage(PayoutStage::Signing);
        let mut signed = self.signer.sign(&tx).await?;
        signed.txid.make_ascii_lowercase();
        if !is_valid_txid(&signed.txid) {
            return Err(PayoutError::SigningFailed(format!(
                "signer returned malformed txid '{}'",
                signed.txid
            )));
        }

        stage(PayoutStage::Broadcasting);
        let receipt = self.broadcast_with_retry(&signed, attempt_count).await?;
        if !is_valid_txid(&receipt.txid) {
            return Err(PayoutError::InternalInconsistency(format!(
                "provider returned malformed txid '{}'",
                receipt.txid
            )));
        }
        if receipt.txid != signed.txid {
            tracing::warn!(
                provider_txid = %receipt.txid,
                signer_txid = %signed.txid,
                "Provider and signer disagree on txid"
            );
        }

        Ok(Submitted {
            receipt,
            fee_sats: selection.fee_sats,
            change_sats: selection.change_sats,
            input_count: selection.input_count(),
            output_count: tx.outputs.len(),
        })
    }

    async fn broadcast_with_retry(
        &self,
        signed: &SignedTransaction,
        attempt_count: &mut u32,
    ) -> PayoutResult<BroadcastReceipt> {
        loop {
            let attempt = *attempt_count + 1;
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before broadcast");
                tokio::time::sleep(delay).await;
            }

            *attempt_count = attempt;
            let err: ProviderError = match with_deadline(
                self.provider_timeout,
                self.provider.broadcast_raw_transaction(&signed.raw_hex),
            )
            .await
            {
                Ok(receipt) => {
                    metrics::record_broadcast_attempt("accepted");
                    if receipt.already_known {
                        tracing::info!(txid = %receipt.txid, "Provider already knew transaction");
                    }
                    return Ok(receipt);
                }
                // The node holds this exact transaction; sending it again changes nothing.
                Err(e) if e.is_already_broadcast() => {
                    metrics::record_broadcast_attempt("already_known");
                    tracing::info!(txid = %signed.txid, attempt, error = %e, "Transaction already on the network");
                    return Ok(BroadcastReceipt {
                        txid: signed.txid.clone(),
                        already_known: true,
                    });
                }
                Err(e) => e,
            };

            let retry = self.retry.should_retry(attempt, &err);
            metrics::record_broadcast_attempt(if retry { "retried" } else { "failed" });
            if !retry {
                return Err(err.into());
            }
            tracing::warn!(
                attempt,
                max_attempts = self.retry.max_attempts,
                error = %err,
                "Broadcast failed, retrying"
            );
        }
    }

    /// Returns `false` when the row could not be written.
    fn track(&self, txid: &str, pool_ref: Option<String>) -> bool {
        let row = TrackedTransaction::new(txid, pool_ref, unix_now());
        match self.tracked.insert_tracked(&row) {
            Ok(true) => {
                tracing::debug!(txid = %txid, "Tracking confirmation");
                true
            }
            Ok(false) => {
                tracing::debug!(txid = %txid, "Transaction already tracked");
                true
            }
            Err(e) => {
                tracing::error!(txid = %txid, error = %e, "Failed to persist tracked transaction");
                metrics::record_tracking_failure();
                false
            }
        }
    }
}

fn stage(stage: PayoutStage) {
    tracing::debug!(stage = %stage, "Payout stage");
}
