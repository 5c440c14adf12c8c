//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → wait_for_termination resolves
//!
//! Shutdown (shutdown.rs):
//!     trigger → poller + purge loop leave their select! loops → exit
//! ```
//!
//! # Design Decisions
//! - In-flight status checks finish; no new tick starts after the signal
//! - Triggering twice is harmless

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_termination;
