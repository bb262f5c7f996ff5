//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! Service startup:
//!     in-process register() or POST /registry/{name} (client.rs)
//!     → store.rs (insert/replace record)
//!
//! Health tracking:
//!     health.rs periodic round → probe GET {base_url}/health
//!     → store.rs update_health()
//!     heartbeats (client.rs) → update_health(name, true)
//!
//! Lookup:
//!     forwarder / aggregation → discover(name)
//! ```

pub mod client;
pub mod health;
pub mod record;
pub mod store;

pub use client::{RegistryClient, RegistryClientError};
pub use health::{HealthChecker, ProbeResult};
pub use record::{Registration, ServiceRecord};
pub use store::{RegistryError, ServiceRegistry};
