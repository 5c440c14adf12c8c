//! Broadcast orchestration subsystem.
//!
//! # Data Flow
//! ```text
//! FundingRequest (request.rs, validated + normalized + hashed)
//!     → IdempotencyLedger::begin (new? replay? conflict?)
//!     → Selecting    (chain provider UTXOs → selection)
//!     → Assembling   (assembly, conservation + dust checks)
//!     → Signing      (signer.rs, external)
//!     → Broadcasting (retry policy + per-attempt deadline)
//!     → Submitted | Failed
//!     → IdempotencyLedger::complete (response.rs payload)
//!     → TrackedTransaction row for the confirmation poller
//! ```
//!
//! # Design Decisions
//! - Only broadcasting retries; every other stage fails fast
//! - The stored payload is returned verbatim on replay
//! - Duplicate suppression rests on store uniqueness, not in-process locks

pub mod orchestrator;
pub mod request;
pub mod response;
pub mod signer;

pub use orchestrator::{BroadcastOrchestrator, PayoutOutcome, PayoutStage};
pub use request::FundingRequest;
pub use response::PayoutResponse;
pub use signer::{SignedTransaction, SignerError, TransactionSigner};
