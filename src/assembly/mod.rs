//! Transaction assembly.
//!
//! Turns a [`SelectionResult`](crate::selection::SelectionResult) into a
//! concrete output set (destination first, change last) and verifies that
//! value is conserved before anything is signed.

pub mod builder;

pub use builder::{
    assemble_transaction, build_outputs, verify_balance, AssembledOutputs, DesiredOutput,
    OutputOptions, TxOutput, UnsignedTransaction,
};
