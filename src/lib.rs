//! Service gateway library: registry, circuit breaking, request forwarding,
//! aggregation endpoints and a TCP round-robin balancer.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod routing;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use registry::{ServiceRecord, ServiceRegistry};
