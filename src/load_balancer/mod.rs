//! Load balancing subsystem (TCP).
//!
//! # Data Flow
//! ```text
//! Client connection on the balancer port
//!     → proxy.rs (accept, connect, splice)
//!     → round_robin.rs (pick next eligible target)
//!     → target.rs (host:port + failure timestamp)
//!     → connect failure / target error → mark_failed → cooldown
//! ```
//!
//! # Design Decisions
//! - Selection is per connection; bytes are never inspected
//! - Failed targets sit out a cooldown instead of being health checked
//! - When every target is cooling down, selection fails open

pub mod proxy;
pub mod round_robin;
pub mod target;

pub use proxy::TcpBalancer;
pub use round_robin::RoundRobin;
pub use target::BalancerTarget;

/// Target selection strategy.
pub trait LoadBalancer: Send + Sync {
    /// Next target to connect to, or `None` when there are no targets.
    fn next_target(&self) -> Option<BalancerTarget>;

    /// Take `addr` out of rotation for the cooldown period.
    fn mark_failed(&self, addr: &str);
}
