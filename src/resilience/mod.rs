//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to a service:
//!     → circuit_breaker.rs (fail fast while the service is known to be down)
//!     → forwarder enforces the per-call timeout
//!     → outcome reported back: unreachable → record_failure, answered → record_success
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - No automatic retries: a failed call is reported to the caller once
//! - Time is read through `clock.rs` so state machines are testable

pub mod circuit_breaker;
pub mod clock;

pub use circuit_breaker::{CircuitBreakers, CircuitSnapshot, CircuitState, TrialGuard};
pub use clock::{Clock, ManualClock, SystemClock};
