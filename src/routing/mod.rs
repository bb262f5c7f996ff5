//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming path (/api/users/7)
//!     → router.rs (route lookup, longest prefix first)
//!     → matcher.rs (segment-aware prefix strip)
//!     → Return: ResolvedRoute { service, path } or NoMatch
//!
//! Route Compilation (at startup / on reload):
//!     RouteConfig[]
//!     → Sort by prefix length
//!     → Freeze as immutable RouteTable
//! ```

pub mod matcher;
pub mod router;

pub use router::{ResolvedRoute, RouteTable};
