//! Output set construction and conservation checks.

use serde::{Deserialize, Serialize};

use crate::chain::UnspentOutput;
use crate::error::{PayoutError, PayoutResult};
use crate::selection::SelectionResult;

/// An output the caller wants to create. `value_sats` is signed so that
/// nonsensical amounts can reach this layer and be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredOutput {
    pub address: String,
    pub value_sats: i64,
}

/// A concrete transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    pub value_sats: u64,
}

#[derive(Debug, Clone, Default)]
pub struct OutputOptions<'a> {
    pub change_address: Option<&'a str>,
    pub change_sats: u64,
    pub dust_threshold: u64,
}

/// Outputs plus the totals callers reconcile fees against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledOutputs {
    /// Desired outputs first, change last.
    pub outputs: Vec<TxOutput>,
    pub output_count: usize,
    /// Change actually included (0 when omitted).
    pub change_sats: u64,
    pub total_output_sats: u64,
}

/// Logical transaction handed to the external signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub inputs: Vec<UnspentOutput>,
    pub outputs: Vec<TxOutput>,
    pub fee_sats: u64,
}

impl UnsignedTransaction {
    pub fn total_input_sats(&self) -> u64 {
        self.inputs.iter().map(|i| i.value_sats).sum()
    }

    pub fn total_output_sats(&self) -> u64 {
        self.outputs.iter().map(|o| o.value_sats).sum()
    }
}

/// Build the output set for a payment.
///
/// Non-positive desired outputs are dropped. Change is appended only when a
/// change address is given and the amount clears the dust threshold.
pub fn build_outputs(desired: &[DesiredOutput], opts: &OutputOptions<'_>) -> AssembledOutputs {
    let mut outputs: Vec<TxOutput> = desired
        .iter()
        .filter(|d| d.value_sats > 0)
        .map(|d| TxOutput {
            address: d.address.clone(),
            value_sats: d.value_sats as u64,
        })
        .collect();

    let mut change_sats = 0;
    if let Some(change_address) = opts.change_address {
        if opts.change_sats >= opts.dust_threshold && opts.change_sats > 0 {
            outputs.push(TxOutput {
                address: change_address.to_string(),
                value_sats: opts.change_sats,
            });
            change_sats = opts.change_sats;
        } else if opts.change_sats > 0 {
            tracing::debug!(
                change_sats = opts.change_sats,
                dust_threshold = opts.dust_threshold,
                "Dropping sub-dust change output"
            );
        }
    }

    let total_output_sats = outputs.iter().map(|o| o.value_sats).sum();
    AssembledOutputs {
        output_count: outputs.len(),
        outputs,
        change_sats,
        total_output_sats,
    }
}

/// Turn a selection into a balanced, dust-free unsigned transaction paying
/// `amount_sats` to `destination`.
pub fn assemble_transaction(
    selection: &SelectionResult,
    destination: &str,
    amount_sats: u64,
    change_address: &str,
    dust_threshold: u64,
) -> PayoutResult<UnsignedTransaction> {
    if amount_sats < dust_threshold {
        return Err(PayoutError::DustOutput {
            value_sats: amount_sats,
            dust_threshold,
        });
    }
    if selection.change_sats > 0 && selection.change_sats < dust_threshold {
        return Err(PayoutError::DustChange {
            change_sats: selection.change_sats,
            dust_threshold,
        });
    }
    let amount = i64::try_from(amount_sats)
        .map_err(|_| PayoutError::InvalidRequest(format!("amount {} out of range", amount_sats)))?;

    let assembled = build_outputs(
        &[DesiredOutput {
            address: destination.to_string(),
            value_sats: amount,
        }],
        &OutputOptions {
            change_address: Some(change_address),
            change_sats: selection.change_sats,
            dust_threshold,
        },
    );

    let tx = UnsignedTransaction {
        inputs: selection.inputs.clone(),
        outputs: assembled.outputs,
        fee_sats: selection.fee_sats,
    };
    verify_balance(&tx, dust_threshold)?;

    if assembled.output_count != selection.output_count {
        return Err(PayoutError::InternalInconsistency(format!(
            "selection planned {} outputs, assembled {}",
            selection.output_count, assembled.output_count
        )));
    }

    Ok(tx)
}

/// Check `Σ outputs + fee = Σ inputs` and that no nonzero output is dust.
pub fn verify_balance(tx: &UnsignedTransaction, dust_threshold: u64) -> PayoutResult<()> {
    if let Some(dust) = tx
        .outputs
        .iter()
        .find(|o| o.value_sats > 0 && o.value_sats < dust_threshold)
    {
        return Err(PayoutError::DustOutput {
            value_sats: dust.value_sats,
            dust_threshold,
        });
    }

    let inputs = tx.total_input_sats();
    let outputs = tx.total_output_sats();
    if outputs.checked_add(tx.fee_sats) != Some(inputs) {
        return Err(PayoutError::InternalInconsistency(format!(
            "unbalanced transaction: inputs {} != outputs {} + fee {}",
            inputs, outputs, tx.fee_sats
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{select_utxos, SelectionOptions};

    fn desired(address: &str, value_sats: i64) -> DesiredOutput {
        DesiredOutput {
            address: address.to_string(),
            value_sats,
        }
    }

    fn utxo(value_sats: u64) -> UnspentOutput {
        UnspentOutput {
            txid: "ab".repeat(32),
            output_index: 0,
            value_sats,
            script_pubkey: String::new(),
            confirmations: 1,
        }
    }

    #[test]
    fn test_change_appended_last() {
        let out = build_outputs(
            &[desired("dest-a", 1000), desired("dest-b", 2000)],
            &OutputOptions {
                change_address: Some("change"),
                change_sats: 5000,
                dust_threshold: 546,
            },
        );
        assert_eq!(out.output_count, 3);
        assert_eq!(out.outputs[0].address, "dest-a");
        assert_eq!(out.outputs[2].address, "change");
        assert_eq!(out.change_sats, 5000);
        assert_eq!(out.total_output_sats, 8000);
    }

    #[test]
    fn test_non_positive_outputs_dropped() {
        let out = build_outputs(
            &[desired("zero", 0), desired("neg", -5), desired("ok", 700)],
            &OutputOptions::default(),
        );
        assert_eq!(out.output_count, 1);
        assert_eq!(out.outputs[0].address, "ok");
    }

    #[test]
    fn test_sub_dust_change_dropped() {
        let out = build_outputs(
            &[desired("dest", 1000)],
            &OutputOptions {
                change_address: Some("change"),
                change_sats: 100,
                dust_threshold: 546,
            },
        );
        assert_eq!(out.output_count, 1);
        assert_eq!(out.change_sats, 0);
    }

    #[test]
    fn test_change_needs_address() {
        let out = build_outputs(
            &[desired("dest", 1000)],
            &OutputOptions {
                change_address: None,
                change_sats: 5000,
                dust_threshold: 546,
            },
        );
        assert_eq!(out.output_count, 1);
        assert_eq!(out.change_sats, 0);
    }

    #[test]
    fn test_assemble_balances() {
        let selection = select_utxos(&[utxo(10_000)], 1000, 1.0, &SelectionOptions::default()).unwrap();
        let tx = assemble_transaction(&selection, "dest", 1000, "source", 546).unwrap();
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.total_output_sats() + tx.fee_sats, tx.total_input_sats());
    }

    #[test]
    fn test_assemble_folded_selection() {
        let selection = select_utxos(&[utxo(1300)], 1000, 1.0, &SelectionOptions::default()).unwrap();
        let tx = assemble_transaction(&selection, "dest", 1000, "source", 546).unwrap();
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.fee_sats, 300);
    }

    #[test]
    fn test_assemble_rejects_dust_change() {
        let mut selection = select_utxos(&[utxo(10_000)], 1000, 1.0, &SelectionOptions::default()).unwrap();
        selection.change_sats = 100;
        let err = assemble_transaction(&selection, "dest", 1000, "source", 546).unwrap_err();
        assert!(matches!(err, PayoutError::DustChange { change_sats: 100, .. }));
    }

    #[test]
    fn test_verify_balance_detects_mismatch() {
        let tx = UnsignedTransaction {
            inputs: vec![utxo(5000)],
            outputs: vec![TxOutput {
                address: "dest".into(),
                value_sats: 4000,
            }],
            fee_sats: 500,
        };
        assert!(matches!(
            verify_balance(&tx, 546),
            Err(PayoutError::InternalInconsistency(_))
        ));
    }
}
