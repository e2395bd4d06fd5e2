//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → broadcast → health monitor stops, listeners drain → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task subscribes
//! - Listeners stop accepting first, in-flight requests complete

pub mod shutdown;

pub use shutdown::{trigger_on_signal, Shutdown};
