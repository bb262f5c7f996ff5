//! Gateway-owned endpoints: info, health, registry and diagnostics.

use axum::{
    extract::{rejection::JsonRejection, OriginalUri, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::http::response::GATEWAY_NAME;
use crate::http::server::AppState;
use crate::registry::Registration;

/// `GET /`
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let routes: Vec<Value> = state
        .routes
        .load()
        .entries()
        .into_iter()
        .map(|(prefix, service)| json!({ "prefix": prefix, "service": service }))
        .collect();

    Json(json!({
        "service": GATEWAY_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
        "endpoints": {
            "health": "/health",
            "registry": "/registry",
            "circuitBreakers": "/circuit-breakers",
            "proxy": "/api/<service>/*",
            "dashboard": "/api/dashboard",
            "search": "/api/search?q=",
        },
        "routes": routes,
        "services": state.registry.names(),
    }))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let services = state.registry.list_services();
    Json(json!({
        "service": GATEWAY_NAME,
        "status": "healthy",
        "timestamp": Utc::now(),
        "serviceCount": services.len(),
        "services": services,
    }))
}

/// `GET /registry`
pub async fn list_registry(State(state): State<AppState>) -> Json<Value> {
    let services = state.registry.list_services();
    Json(json!({
        "success": true,
        "count": services.len(),
        "services": services,
        "timestamp": Utc::now(),
    }))
}

/// `GET /registry/{name}`
pub async fn discover(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let record = state
        .registry
        .discover(&name)
        .map_err(|_| GatewayError::ServiceNotFound {
            service: name,
            available: state.registry.names(),
        })?;
    Ok(Json(json!({ "success": true, "data": record })))
}

/// `POST /registry/{name}`
pub async fn register(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(registration) =
        payload.map_err(|e| GatewayError::InvalidRequest(format!("invalid registration: {}", e.body_text())))?;
    let record = registration
        .into_record(&name)
        .map_err(GatewayError::InvalidRequest)?;

    state.registry.register(record.clone());
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": format!("service {} registered", name), "data": record })),
    )
        .into_response())
}

/// `DELETE /registry/{name}`
pub async fn unregister(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    if !state.registry.unregister(&name) {
        return Err(GatewayError::ServiceNotFound {
            service: name,
            available: state.registry.names(),
        });
    }
    Ok(Json(json!({ "success": true, "message": format!("service {} unregistered", name) })))
}

/// `POST /registry/{name}/heartbeat`
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    if state.registry.discover(&name).is_err() {
        return Err(GatewayError::ServiceNotFound {
            service: name,
            available: state.registry.names(),
        });
    }
    state.registry.update_health(&name, true);
    Ok(Json(json!({ "success": true, "message": "heartbeat recorded" })))
}

/// `GET /circuit-breakers`
pub async fn circuit_breakers(State(state): State<AppState>) -> Json<Value> {
    let breakers = state.breakers.snapshot();
    Json(json!({
        "success": true,
        "failureThreshold": state.breakers.failure_threshold(),
        "breakers": breakers,
    }))
}

/// Anything the router does not know.
pub async fn fallback(OriginalUri(uri): OriginalUri) -> GatewayError {
    tracing::debug!(path = %uri.path(), "No endpoint matched");
    GatewayError::RouteNotFound(uri.path().to_string())
}
