//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with gateway, registry and proxy handlers
//! - Wire up middleware (request ID, tracing, timeouts, gateway headers)
//! - Own the shared state: registry, circuit breakers, route table
//! - Start the registry health checker alongside the listener
//! - Apply hot-reloaded configuration
//!
//! # Design Decisions
//! - Route table and aggregation plan live behind `ArcSwap` so a reload
//!   never blocks in-flight requests
//! - Listener address, breaker and balancer settings need a restart

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{AggregationConfig, GatewayConfig};
use crate::error::GatewayError;
use crate::http::aggregate::{self, Aggregator};
use crate::http::forwarder::{ForwardRequest, Forwarder};
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, request_id_or_new, set_request_id_layer};
use crate::http::response::{gateway_header_layer, gateway_version_layer};
use crate::observability::metrics;
use crate::registry::{HealthChecker, ServiceRegistry};
use crate::resilience::CircuitBreakers;
use crate::routing::RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: ServiceRegistry,
    pub breakers: CircuitBreakers,
    pub forwarder: Arc<Forwarder>,
    pub aggregator: Aggregator,
    pub routes: Arc<ArcSwap<RouteTable>>,
    pub aggregation: Arc<ArcSwap<AggregationConfig>>,
    pub max_body_bytes: usize,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a server with an empty registry.
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_registry(config, ServiceRegistry::new())
    }

    /// Create a server around an existing registry.
    pub fn with_registry(config: GatewayConfig, registry: ServiceRegistry) -> Self {
        let breakers = CircuitBreakers::new(&config.circuit_breaker);
        Self::with_parts(config, registry, breakers)
    }

    /// Create a server around an existing registry and breaker set.
    pub fn with_parts(config: GatewayConfig, registry: ServiceRegistry, breakers: CircuitBreakers) -> Self {
        let forwarder = Arc::new(Forwarder::new(
            registry.clone(),
            breakers.clone(),
            config.proxy.timeout(),
        ));
        let routes = RouteTable::from_config(&config.routes, config.proxy.dynamic_routes);

        let state = AppState {
            registry: registry.clone(),
            breakers,
            forwarder,
            aggregator: Aggregator::new(registry),
            routes: Arc::new(ArcSwap::from_pointee(routes)),
            aggregation: Arc::new(ArcSwap::from_pointee(config.aggregation.clone())),
            max_body_bytes: config.proxy.max_body_bytes,
        };

        let router = Self::build_router(&config, state.clone());
        Self { router, state, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        // Leave room for the forwarder's own timeout to answer first.
        let request_timeout = config.proxy.timeout() + Duration::from_secs(5);

        Router::new()
            .route("/", get(handlers::root))
            .route("/health", get(handlers::health))
            .route("/registry", get(handlers::list_registry))
            .route(
                "/registry/{name}",
                get(handlers::discover)
                    .post(handlers::register)
                    .delete(handlers::unregister),
            )
            .route("/registry/{name}/heartbeat", post(handlers::heartbeat))
            .route("/circuit-breakers", get(handlers::circuit_breakers))
            .route("/api/dashboard", get(aggregate::dashboard))
            .route("/api/search", get(aggregate::search))
            .route("/api/{*path}", any(proxy_handler))
            .fallback(handlers::fallback)
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(gateway_header_layer())
            .layer(gateway_version_layer())
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The fully layered router, without connection info.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn registry(&self) -> ServiceRegistry {
        self.state.registry.clone()
    }

    pub fn circuit_breakers(&self) -> CircuitBreakers {
        self.state.breakers.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Apply the reloadable parts of a new configuration.
    pub fn reload(&self, config: &GatewayConfig) {
        apply_reload(&self.state, config);
    }

    /// Apply every configuration pushed on `updates` until the channel closes.
    pub fn watch_config(&self, mut updates: mpsc::UnboundedReceiver<GatewayConfig>) -> JoinHandle<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                apply_reload(&state, &config);
            }
        })
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let checker = HealthChecker::new(self.state.registry.clone(), self.config.health_check.clone());
        let health_task = checker.spawn(shutdown.resubscribe());

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        health_task.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn apply_reload(state: &AppState, config: &GatewayConfig) {
    let routes = RouteTable::from_config(&config.routes, config.proxy.dynamic_routes);
    state.routes.store(Arc::new(routes));
    state.aggregation.store(Arc::new(config.aggregation.clone()));
    tracing::info!(
        routes = config.routes.len(),
        dashboard_slices = config.aggregation.dashboard.len(),
        search_slices = config.aggregation.search.len(),
        "Configuration reloaded"
    );
}

/// Main proxy handler.
/// Resolves the route, buffers the body and hands off to the forwarder.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let result = forward(&state, addr, request).await;
    let (service, response) = match result {
        Ok((service, response)) => (service, response),
        Err((service, e)) => (service, e.into_response()),
    };

    metrics::record_request(&method, response.status().as_u16(), &service, start);
    response
}

async fn forward(
    state: &AppState,
    addr: SocketAddr,
    request: Request<Body>,
) -> Result<(String, Response), (String, GatewayError)> {
    let request_id = request_id_or_new(request.headers());
    let path = request.uri().path().to_string();

    let route = state
        .routes
        .load()
        .resolve(&path)
        .ok_or_else(|| ("none".to_string(), GatewayError::RouteNotFound(path.clone())))?;
    let service = route.service;

    tracing::debug!(request_id = %request_id, path = %path, service = %service, "Route resolved");

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, state.max_body_bytes).await.map_err(|e| {
        (
            service.clone(),
            GatewayError::InvalidRequest(format!("unreadable request body: {}", e)),
        )
    })?;

    let forward = ForwardRequest {
        service: service.clone(),
        method: parts.method,
        path: route.path,
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
        client_addr: Some(addr),
        request_id,
    };

    match state.forwarder.forward(forward).await {
        Ok(response) => Ok((service, response)),
        Err(e) => Err((service, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::registry::ServiceRecord;

    fn server() -> HttpServer {
        let mut config = GatewayConfig::default();
        config.health_check.enabled = false;
        HttpServer::new(config)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_registered_services() {
        let server = server();
        server
            .registry()
            .register(ServiceRecord::new("user-service", "http://127.0.0.1:3001"));

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["serviceCount"], 1);
        assert!(body["services"]["user-service"].is_object());
    }

    #[tokio::test]
    async fn register_returns_created_record() {
        let server = server();
        let request = Request::builder()
            .method("POST")
            .uri("/registry/product-service")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"url":"http://127.0.0.1:3002","version":"2.0.0"}"#))
            .unwrap();

        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["data"]["baseUrl"], "http://127.0.0.1:3002");
        assert_eq!(server.registry().discover("product-service").unwrap().version.as_deref(), Some("2.0.0"));
    }

    #[tokio::test]
    async fn unregister_unknown_service_fails() {
        let request = Request::builder()
            .method("DELETE")
            .uri("/registry/ghost")
            .body(Body::empty())
            .unwrap();
        let response = server().router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unknown_path_falls_back_to_404() {
        let request = Request::builder().uri("/does/not/exist").body(Body::empty()).unwrap();
        let response = server().router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["availableEndpoints"]["dashboard"], "/api/dashboard");
    }
}
