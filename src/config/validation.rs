//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that route prefixes are well-formed and unique
//! - Validate value ranges (timeouts > 0, thresholds > 0, addresses parse)
//! - Check that the balancer has a usable target pool
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{AggregateQuery, GatewayConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. "routes[2].prefix").
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    let mut prefixes = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{}]", i);
        if !route.prefix.starts_with('/') || route.prefix.len() < 2 {
            errors.push(ValidationError::new(
                format!("{}.prefix", field),
                format!("'{}' must start with '/' and name at least one segment", route.prefix),
            ));
        }
        if route.prefix.ends_with('/') {
            errors.push(ValidationError::new(
                format!("{}.prefix", field),
                format!("'{}' must not end with '/'", route.prefix),
            ));
        }
        if !prefixes.insert(route.prefix.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.prefix", field),
                format!("duplicate prefix '{}'", route.prefix),
            ));
        }
        if route.service.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.service", field), "must not be empty"));
        }
        if !route.default_path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("{}.default_path", field),
                "must start with '/'",
            ));
        }
        if let Some(upstream) = &route.upstream_prefix {
            if !upstream.starts_with('/') || upstream.ends_with('/') {
                errors.push(ValidationError::new(
                    format!("{}.upstream_prefix", field),
                    format!("'{}' must start with '/' and not end with '/'", upstream),
                ));
            }
        }
    }

    if config.proxy.timeout_secs == 0 {
        errors.push(ValidationError::new("proxy.timeout_secs", "must be greater than 0"));
    }
    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be greater than 0",
        ));
    }

    if config.health_check.enabled {
        if config.health_check.interval_secs == 0 {
            errors.push(ValidationError::new("health_check.interval_secs", "must be greater than 0"));
        }
        if config.health_check.timeout_secs == 0 {
            errors.push(ValidationError::new("health_check.timeout_secs", "must be greater than 0"));
        }
        if !config.health_check.path.starts_with('/') {
            errors.push(ValidationError::new("health_check.path", "must start with '/'"));
        }
    }

    if config.aggregation.timeout_ms == 0 {
        errors.push(ValidationError::new("aggregation.timeout_ms", "must be greater than 0"));
    }
    check_queries(&mut errors, "aggregation.dashboard", &config.aggregation.dashboard);
    check_queries(&mut errors, "aggregation.search", &config.aggregation.search);

    if config.balancer.enabled {
        check_socket_addr(
            &mut errors,
            "balancer.listener.bind_address",
            &config.balancer.listener.bind_address,
        );
        if config.balancer.targets.is_empty() {
            errors.push(ValidationError::new("balancer.targets", "at least one target is required"));
        }
        for (i, target) in config.balancer.targets.iter().enumerate() {
            if crate::load_balancer::BalancerTarget::parse(target).is_none() {
                errors.push(ValidationError::new(
                    format!("balancer.targets[{}]", i),
                    format!("'{}' is not a host:port pair", target),
                ));
            }
        }
    }

    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be 'pretty' or 'json'",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a valid socket address", value),
        ));
    }
}

fn check_queries(errors: &mut Vec<ValidationError>, field: &str, queries: &[AggregateQuery]) {
    let mut keys = HashSet::new();
    for (i, query) in queries.iter().enumerate() {
        if !keys.insert(query.key.as_str()) {
            errors.push(ValidationError::new(
                format!("{}[{}].key", field, i),
                format!("duplicate key '{}'", query.key),
            ));
        }
        if !query.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("{}[{}].path", field, i),
                "must start with '/'",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.circuit_breaker.failure_threshold = 0;
        config.routes.push(RouteConfig::new("/api/users", "dup", "/"));
        config.routes.push(RouteConfig::new("api/bad/", "", "x").with_upstream_prefix("bad/"));

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();

        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"circuit_breaker.failure_threshold"));
        assert!(fields.contains(&"routes[5].prefix"));
        assert!(fields.contains(&"routes[6].service"));
        assert!(fields.contains(&"routes[6].default_path"));
        assert!(fields.contains(&"routes[6].upstream_prefix"));
    }

    #[test]
    fn enabled_balancer_needs_parseable_targets() {
        let mut config = GatewayConfig::default();
        config.balancer.enabled = true;
        config.balancer.targets = vec!["127.0.0.1:50051".into(), "no-port".into()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "balancer.targets[1]");
    }
}
