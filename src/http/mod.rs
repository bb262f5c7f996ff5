//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, shared state)
//!     → request.rs (add/propagate request ID)
//!     → handlers.rs (gateway-owned endpoints: info, health, registry)
//!     → aggregate.rs (dashboard/search fan-out)
//!     → [routing layer resolves service] → forwarder.rs (breaker, registry, upstream call)
//!     → response.rs (hop-by-hop stripping, gateway headers)
//!     → Send to client
//! ```

pub mod aggregate;
pub mod forwarder;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use aggregate::Aggregator;
pub use forwarder::{ForwardRequest, Forwarder};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
