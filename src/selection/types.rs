//! Coin selection types.

use serde::{Deserialize, Serialize};

use crate::chain::UnspentOutput;

/// Standard dust threshold for P2PKH outputs, in satoshis.
pub const DEFAULT_DUST_THRESHOLD: u64 = 546;

/// Knobs for a single selection run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionOptions {
    /// Smallest spendable output value.
    pub dust_threshold: u64,
    /// Outputs the transaction carries before any change output.
    pub outputs_without_change: usize,
    /// Multiplier on the target to absorb fee-rate estimation error (≥ 1.0).
    pub headroom_factor: f64,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            dust_threshold: DEFAULT_DUST_THRESHOLD,
            outputs_without_change: 1,
            headroom_factor: 1.0,
        }
    }
}

/// Outcome of a successful selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Inputs in spend order.
    pub inputs: Vec<UnspentOutput>,
    pub total_input_sats: u64,
    pub fee_sats: u64,
    /// Zero when no change output is created.
    pub change_sats: u64,
    /// Natural change was below dust and was folded into the fee.
    pub change_is_dust: bool,
    pub output_count: usize,
}

impl SelectionResult {
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn has_change(&self) -> bool {
        self.change_sats > 0
    }
}
