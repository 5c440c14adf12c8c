//! Coin selection subsystem.
//!
//! # Data Flow
//! ```text
//! Provider UTXO snapshot (read-only)
//!     → selector.rs (sort, accumulate, fee estimate, dust fold)
//!     → SelectionResult (inputs, fee, change)
//!     → assembly
//! ```
//!
//! # Design Decisions
//! - Smallest-first keeps large coins intact and reduces fragmentation
//! - Fee is estimated assuming a change output until proven otherwise
//! - Sub-dust change is folded into the fee, never emitted
//! - No randomness: identical inputs always select identically

pub mod selector;
pub mod types;

pub use selector::{estimate_fee, estimate_tx_size, select_utxos};
pub use types::{SelectionOptions, SelectionResult, DEFAULT_DUST_THRESHOLD};
