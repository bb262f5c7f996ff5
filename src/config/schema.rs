//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway
//! and the TCP balancer. All types derive Serde traits for deserialization
//! from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Public HTTP listener of the gateway.
    pub listener: ListenerConfig,

    /// Route table mapping public path prefixes to logical services.
    pub routes: Vec<RouteConfig>,

    /// Forwarding behaviour.
    pub proxy: ProxyConfig,

    /// Per-service circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Registry health-check loop settings.
    pub health_check: HealthCheckConfig,

    /// Dashboard and search fan-out plans.
    pub aggregation: AggregationConfig,

    /// Raw TCP round-robin balancer.
    pub balancer: BalancerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            routes: RouteConfig::defaults(),
            proxy: ProxyConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            health_check: HealthCheckConfig::default(),
            aggregation: AggregationConfig::default(),
            balancer: BalancerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_connections: 10_000,
        }
    }
}

/// One entry of the route table.
///
/// `prefix + rest` is forwarded to `service` as `rest`; an empty `rest`
/// becomes `default_path`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Public path prefix (e.g., "/api/users").
    pub prefix: String,

    /// Logical service name looked up in the registry.
    pub service: String,

    /// Path used when nothing follows the prefix.
    #[serde(default = "default_root_path")]
    pub default_path: String,

    /// Prepended to the remainder on the upstream side. Without it the
    /// prefix is stripped and the remainder is sent as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_prefix: Option<String>,
}

fn default_root_path() -> String {
    "/".to_string()
}

impl RouteConfig {
    pub fn new(prefix: &str, service: &str, default_path: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            service: service.to_string(),
            default_path: default_path.to_string(),
            upstream_prefix: None,
        }
    }

    /// Map the remainder under `prefix` instead of forwarding it bare
    /// (`/api/lists/42` → `/lists/42`).
    pub fn with_upstream_prefix(mut self, prefix: &str) -> Self {
        self.upstream_prefix = Some(prefix.to_string());
        self
    }

    /// Routes for the stock shopping-list services.
    ///
    /// The user service mounts `/auth/*` and `/users/*` itself, so its prefix
    /// is only stripped. The others serve under their own resource prefix.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("/api/users", "user-service", "/users"),
            Self::new("/api/auth", "user-service", "/auth").with_upstream_prefix("/auth"),
            Self::new("/api/products", "product-service", "/products").with_upstream_prefix("/products"),
            Self::new("/api/lists", "list-service", "/lists").with_upstream_prefix("/lists"),
            Self::new("/api/items", "item-service", "/items").with_upstream_prefix("/items"),
        ]
    }
}

/// Forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Timeout for one forwarded call, in seconds.
    pub timeout_secs: u64,

    /// Largest request body buffered for forwarding.
    pub max_body_bytes: usize,

    /// Forward `/api/<name>/...` to service `<name>` when no route entry matches.
    pub dynamic_routes: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_body_bytes: 2 * 1024 * 1024,
            dynamic_routes: true,
        }
    }
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Seconds after the last failure before a trial call is let through.
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 30,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the periodic health-check loop.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Delay before the first round, in seconds.
    pub initial_delay_secs: u64,

    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,

    /// Path probed on every registered service.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            initial_delay_secs: 5,
            timeout_secs: 5,
            path: "/health".to_string(),
        }
    }
}

/// One backend call of an aggregation endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AggregateQuery {
    /// Key of this slice in the aggregate response.
    pub key: String,

    /// Logical service name.
    pub service: String,

    /// Path on the service.
    pub path: String,

    /// Fixed query parameters.
    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// Pass the caller's `Authorization` header along.
    #[serde(default)]
    pub forward_auth: bool,

    /// Skip this slice entirely when the caller sent no `Authorization` header.
    #[serde(default)]
    pub requires_auth: bool,
}

impl AggregateQuery {
    pub fn new(key: &str, service: &str, path: &str) -> Self {
        Self {
            key: key.to_string(),
            service: service.to_string(),
            path: path.to_string(),
            query: BTreeMap::new(),
            forward_auth: false,
            requires_auth: false,
        }
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub fn forwarding_auth(mut self) -> Self {
        self.forward_auth = true;
        self
    }

    pub fn requiring_auth(mut self) -> Self {
        self.requires_auth = true;
        self.forward_auth = true;
        self
    }
}

/// Aggregation endpoints configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Timeout of each sub-query in milliseconds.
    pub timeout_ms: u64,

    /// Slices of `GET /api/dashboard`.
    pub dashboard: Vec<AggregateQuery>,

    /// Slices of `GET /api/search`; each receives the `q` parameter.
    pub search: Vec<AggregateQuery>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            dashboard: vec![
                AggregateQuery::new("users", "user-service", "/users")
                    .with_param("limit", "5")
                    .forwarding_auth(),
                AggregateQuery::new("products", "product-service", "/products")
                    .with_param("limit", "5"),
                AggregateQuery::new("categories", "product-service", "/categories"),
            ],
            search: vec![
                AggregateQuery::new("products", "product-service", "/search"),
                AggregateQuery::new("users", "user-service", "/search")
                    .with_param("limit", "5")
                    .requiring_auth(),
            ],
        }
    }
}

impl AggregationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// TCP round-robin balancer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Run the balancer next to the gateway.
    pub enabled: bool,

    /// Balancer listener.
    pub listener: ListenerConfig,

    /// Backend pool as "host:port" strings.
    pub targets: Vec<String>,

    /// Seconds a failed target is skipped.
    pub failure_cooldown_secs: u64,

    /// Outbound connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Grace period for in-flight connections on shutdown, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listener: ListenerConfig {
                bind_address: "0.0.0.0:50050".to_string(),
                max_connections: 10_000,
            },
            targets: vec!["127.0.0.1:50051".to_string(), "127.0.0.1:50052".to_string()],
            failure_cooldown_secs: 15,
            connect_timeout_secs: 5,
            drain_timeout_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
