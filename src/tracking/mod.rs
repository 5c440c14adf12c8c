//! Confirmation tracking subsystem.
//!
//! # Data Flow
//! ```text
//! ticker (poller.interval_ms)
//!     → monitor.rs tick: re-entrancy guard
//!     → store: unconfirmed rows with next_check_at <= now (batch_size)
//!     → provider status query per row (bounded concurrency + deadline)
//!     → confirmed: mark once | otherwise: next step on the backoff ladder
//! ```
//!
//! # Design Decisions
//! - One tick at a time; an overlapping tick is skipped, not queued
//! - A failing row never aborts its batch
//! - Provider errors reschedule like "not yet confirmed"

pub mod monitor;
pub mod types;

pub use monitor::{ConfirmationPoller, StatusReport};
pub use types::{ladder_delay_secs, TickSummary, TrackedTransaction, BACKOFF_LADDER_SECS};
