//! Smallest-first coin selection with dust folding.

use std::cmp::Ordering;

use crate::chain::UnspentOutput;
use crate::error::{PayoutError, PayoutResult};
use crate::selection::types::{SelectionOptions, SelectionResult};

/// Version + locktime + varints.
const TX_OVERHEAD: u64 = 10;
/// Average signed P2PKH input.
const P2PKH_INPUT_SIZE: u64 = 148;
const P2PKH_OUTPUT_SIZE: u64 = 34;
const SIZE_SAFETY_BUFFER: u64 = 10;

/// Estimated serialized size in bytes.
pub fn estimate_tx_size(inputs: usize, outputs: usize) -> u64 {
    TX_OVERHEAD
        + P2PKH_INPUT_SIZE * inputs as u64
        + P2PKH_OUTPUT_SIZE * outputs as u64
        + SIZE_SAFETY_BUFFER
}

/// Fee for a transaction of the given shape, rounded up to whole satoshis.
pub fn estimate_fee(inputs: usize, outputs: usize, fee_rate: f64) -> u64 {
    (estimate_tx_size(inputs, outputs) as f64 * fee_rate).ceil() as u64
}

/// Candidate order: ascending value, then best-confirmed first. The outpoint
/// tie-break keeps the order total.
fn candidate_order(a: &UnspentOutput, b: &UnspentOutput) -> Ordering {
    a.value_sats
        .cmp(&b.value_sats)
        .then_with(|| b.confirmations.cmp(&a.confirmations))
        .then_with(|| a.txid.cmp(&b.txid))
        .then_with(|| a.output_index.cmp(&b.output_index))
}

fn validate_inputs(target_sats: u64, fee_rate: f64, opts: &SelectionOptions) -> PayoutResult<()> {
    if target_sats == 0 {
        return Err(PayoutError::InvalidRequest("target must be positive".to_string()));
    }
    if !fee_rate.is_finite() || fee_rate <= 0.0 {
        return Err(PayoutError::InvalidRequest(format!("invalid fee rate {}", fee_rate)));
    }
    if !opts.headroom_factor.is_finite() || opts.headroom_factor < 1.0 {
        return Err(PayoutError::InvalidRequest(format!(
            "headroom factor must be >= 1.0, got {}",
            opts.headroom_factor
        )));
    }
    if opts.outputs_without_change == 0 {
        return Err(PayoutError::InvalidRequest("at least one output is required".to_string()));
    }
    if target_sats < opts.dust_threshold {
        return Err(PayoutError::DustOutput {
            value_sats: target_sats,
            dust_threshold: opts.dust_threshold,
        });
    }
    Ok(())
}

/// Pick inputs from `available` that fund `target_sats` at `fee_rate`
/// sat/byte.
///
/// Candidates are consumed smallest first. After each one the fee is
/// recomputed assuming a change output; selection stops as soon as the
/// inputs cover `target * headroom + fee`. A natural change below the dust
/// threshold is never emitted: it is folded into the fee instead.
pub fn select_utxos(
    available: &[UnspentOutput],
    target_sats: u64,
    fee_rate: f64,
    opts: &SelectionOptions,
) -> PayoutResult<SelectionResult> {
    validate_inputs(target_sats, fee_rate, opts)?;

    let required_target = (target_sats as f64 * opts.headroom_factor).ceil() as u64;

    let mut candidates: Vec<&UnspentOutput> =
        available.iter().filter(|u| u.value_sats > 0).collect();
    candidates.sort_by(|a, b| candidate_order(a, b));

    let mut inputs: Vec<UnspentOutput> = Vec::new();
    let mut total: u64 = 0;
    let mut fee = estimate_fee(1, opts.outputs_without_change + 1, fee_rate);

    for utxo in candidates {
        total = total.saturating_add(utxo.value_sats);
        inputs.push(utxo.clone());
        fee = estimate_fee(inputs.len(), opts.outputs_without_change + 1, fee_rate);

        if total >= required_target.saturating_add(fee) {
            return finalize(inputs, total, target_sats, fee, fee_rate, opts);
        }
    }

    tracing::debug!(
        available_sats = total,
        target_sats,
        candidates = inputs.len(),
        "Coin selection exhausted candidates"
    );

    Err(PayoutError::InsufficientFunds {
        available_sats: total,
        required_sats: required_target.saturating_add(fee),
    })
}

fn finalize(
    inputs: Vec<UnspentOutput>,
    total: u64,
    target_sats: u64,
    fee_with_change: u64,
    fee_rate: f64,
    opts: &SelectionOptions,
) -> PayoutResult<SelectionResult> {
    let change = total - target_sats - fee_with_change;

    if change > 0 && change < opts.dust_threshold {
        let fee_without_change = estimate_fee(inputs.len(), opts.outputs_without_change, fee_rate);
        if total < target_sats.saturating_add(fee_without_change) {
            return Err(PayoutError::InsufficientFunds {
                available_sats: total,
                required_sats: target_sats.saturating_add(fee_without_change),
            });
        }

        let folded_fee = total - target_sats;
        tracing::debug!(
            dust_change = change,
            fee_before = fee_with_change,
            fee_after = folded_fee,
            "Folding dust change into fee"
        );

        return Ok(SelectionResult {
            inputs,
            total_input_sats: total,
            fee_sats: folded_fee,
            change_sats: 0,
            change_is_dust: true,
            output_count: opts.outputs_without_change,
        });
    }

    let output_count = opts.outputs_without_change + usize::from(change > 0);
    Ok(SelectionResult {
        inputs,
        total_input_sats: total,
        fee_sats: fee_with_change,
        change_sats: change,
        change_is_dust: false,
        output_count,
    })
}
