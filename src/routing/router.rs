//! Route lookup and path rewriting.
//!
//! # Responsibilities
//! - Store the compiled route table
//! - Resolve a public path to (service, upstream path)
//! - Return an explicit no-match instead of a silent default
//!
//! # Design Decisions
//! - Immutable after construction (hot reload swaps whole tables)
//! - Longest prefix wins; ties cannot happen since prefixes are unique
//! - Adding a service means adding a table entry, never code

use crate::config::RouteConfig;
use crate::routing::matcher::PathPrefixMatcher;

/// Prefix under which unknown services are resolved dynamically.
pub const DYNAMIC_PREFIX: &str = "/api";

#[derive(Debug, Clone)]
struct Route {
    matcher: PathPrefixMatcher,
    service: String,
    default_path: String,
    upstream_prefix: Option<String>,
}

/// Where a public request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub service: String,
    /// Path on the service, without query string.
    pub path: String,
}

/// Compiled, immutable route table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    dynamic: bool,
}

impl RouteTable {
    pub fn from_config(configs: &[RouteConfig], dynamic: bool) -> Self {
        let mut routes: Vec<Route> = configs
            .iter()
            .map(|c| Route {
                matcher: PathPrefixMatcher::new(c.prefix.as_str()),
                service: c.service.clone(),
                default_path: c.default_path.clone(),
                upstream_prefix: c.upstream_prefix.clone(),
            })
            .collect();
        routes.sort_by(|a, b| b.matcher.prefix().len().cmp(&a.matcher.prefix().len()));

        tracing::debug!(routes = routes.len(), dynamic, "Route table compiled");
        Self { routes, dynamic }
    }

    /// Resolve a public path.
    pub fn resolve(&self, path: &str) -> Option<ResolvedRoute> {
        for route in &self.routes {
            if let Some(rest) = route.matcher.strip(path) {
                return Some(ResolvedRoute {
                    service: route.service.clone(),
                    path: rewrite(rest, &route.default_path, route.upstream_prefix.as_deref()),
                });
            }
        }

        if self.dynamic {
            return resolve_dynamic(path);
        }
        None
    }

    /// (prefix, service) pairs for diagnostics.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.routes
            .iter()
            .map(|r| (r.matcher.prefix().to_string(), r.service.clone()))
            .collect()
    }
}

fn rewrite(rest: &str, default_path: &str, upstream_prefix: Option<&str>) -> String {
    if rest.is_empty() || rest == "/" {
        return default_path.to_string();
    }
    match upstream_prefix {
        Some(prefix) => format!("{}{}", prefix, rest),
        None => rest.to_string(),
    }
}

/// `/api/<name>/<rest>` → service `<name>`, path `/<rest>`.
fn resolve_dynamic(path: &str) -> Option<ResolvedRoute> {
    let after = PathPrefixMatcher::new(DYNAMIC_PREFIX).strip(path)?;
    let after = after.strip_prefix('/')?;
    let (service, rest) = match after.find('/') {
        Some(idx) => (&after[..idx], &after[idx..]),
        None => (after, ""),
    };
    if service.is_empty() {
        return None;
    }
    Some(ResolvedRoute {
        service: service.to_string(),
        path: rewrite(rest, "/", None),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(dynamic: bool) -> RouteTable {
        RouteTable::from_config(&RouteConfig::defaults(), dynamic)
    }

    fn resolved(service: &str, path: &str) -> Option<ResolvedRoute> {
        Some(ResolvedRoute {
            service: service.into(),
            path: path.into(),
        })
    }

    #[test]
    fn strips_prefix_and_keeps_remainder() {
        let t = table(false);
        assert_eq!(t.resolve("/api/users/auth/login"), resolved("user-service", "/auth/login"));
        assert_eq!(t.resolve("/api/users/7"), resolved("user-service", "/7"));
    }

    #[test]
    fn upstream_prefix_keeps_the_service_namespace() {
        let t = table(false);
        assert_eq!(t.resolve("/api/lists/42"), resolved("list-service", "/lists/42"));
        assert_eq!(t.resolve("/api/lists/42/items"), resolved("list-service", "/lists/42/items"));
        assert_eq!(t.resolve("/api/items/7"), resolved("item-service", "/items/7"));
        assert_eq!(t.resolve("/api/products/9"), resolved("product-service", "/products/9"));
        assert_eq!(t.resolve("/api/auth/login"), resolved("user-service", "/auth/login"));
        assert_eq!(t.resolve("/api/lists"), resolved("list-service", "/lists"));
    }

    #[test]
    fn empty_remainder_uses_default_path() {
        let t = table(false);
        assert_eq!(t.resolve("/api/users"), resolved("user-service", "/users"));
        assert_eq!(t.resolve("/api/products/"), resolved("product-service", "/products"));
    }

    #[test]
    fn longest_prefix_wins() {
        let mut configs = RouteConfig::defaults();
        configs.push(RouteConfig::new("/api/users/admin", "admin-service", "/admin"));
        let t = RouteTable::from_config(&configs, false);

        assert_eq!(t.resolve("/api/users/admin"), resolved("admin-service", "/admin"));
        assert_eq!(t.resolve("/api/users/7"), resolved("user-service", "/7"));
    }

    #[test]
    fn dynamic_routes_take_the_first_segment_as_service() {
        let t = table(true);
        assert_eq!(t.resolve("/api/svc-a/items"), resolved("svc-a", "/items"));
        assert_eq!(t.resolve("/api/svc-a"), resolved("svc-a", "/"));
        assert_eq!(t.resolve("/api/"), None);
        assert_eq!(t.resolve("/other/path"), None);
    }

    #[test]
    fn no_match_without_dynamic_routes() {
        assert_eq!(table(false).resolve("/api/svc-a/items"), None);
    }
}
