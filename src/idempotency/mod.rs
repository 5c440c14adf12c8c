//! Idempotency subsystem.
//!
//! # Data Flow
//! ```text
//! request (key, normalized body)
//!     → ledger.rs begin(): insert-or-ignore pending record
//!         new      → caller executes the side effect
//!         same hash→ replay stored result (or in-flight, or stale past the lease)
//!         diff hash→ IdempotencyConflict
//!     → ledger.rs complete(): finalize once with the result payload
//! ```
//!
//! # Design Decisions
//! - A key is bound to one request body forever; it is not a retry token
//! - The store's unique key is the only race arbiter
//! - Finalized records expire after a TTL; pending ones never do, they are
//!   reported as stale once they outlive the lease

pub mod ledger;
pub mod types;

pub use ledger::{hash_request, IdempotencyLedger, DEFAULT_PENDING_LEASE};
pub use types::{BeginOutcome, IdempotencyRecord, LedgerStatus};
