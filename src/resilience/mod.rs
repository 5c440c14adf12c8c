//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to provider:
//!     → timeouts.rs (enforce deadline)
//!     → On failure: retries.rs (typed retryable? attempts left?)
//!     → backoff.rs (exponential delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only broadcasts retry; deterministic failures never do
//! - Jitter is opt-in so schedules stay reproducible by default

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::RetryPolicy;
pub use timeouts::with_deadline;
