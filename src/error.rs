//! Gateway error taxonomy and its HTTP mapping.
//!
//! Every failure the gateway reports is one of these variants; the mapping
//! to status and JSON body happens once, in [`IntoResponse`].

use axum::{
    body::Bytes,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("service {service} not found")]
    ServiceNotFound { service: String, available: Vec<String> },

    #[error("service {service} temporarily unavailable (circuit open)")]
    CircuitOpen { service: String },

    #[error("service {service} unavailable: {detail}")]
    UpstreamUnavailable {
        service: String,
        /// Low-level cause such as `ECONNREFUSED` or `ETIMEDOUT`.
        code: &'static str,
        detail: String,
    },

    #[error("service {service} responded with {status}")]
    UpstreamApplication {
        service: String,
        status: StatusCode,
        body: Bytes,
    },

    #[error("{0}")]
    Validation(String),

    #[error("endpoint not found: {0}")]
    RouteNotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("internal gateway error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::ServiceNotFound { .. }
            | GatewayError::CircuitOpen { .. }
            | GatewayError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamApplication { status, .. } => *status,
            GatewayError::Validation(_) | GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for infrastructure errors.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            GatewayError::ServiceNotFound { .. } => Some("SERVICE_NOT_FOUND"),
            GatewayError::CircuitOpen { .. } => Some("CIRCUIT_OPEN"),
            GatewayError::UpstreamUnavailable { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let code = self.code();

        match self {
            GatewayError::UpstreamApplication { body, .. } => {
                (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
            }
            GatewayError::ServiceNotFound { service, available } => (
                status,
                Json(json!({
                    "success": false,
                    "message": message,
                    "service": service,
                    "error": code,
                    "availableServices": available,
                })),
            )
                .into_response(),
            GatewayError::CircuitOpen { service } | GatewayError::UpstreamUnavailable { service, .. } => (
                status,
                Json(json!({
                    "success": false,
                    "message": message,
                    "service": service,
                    "error": code,
                })),
            )
                .into_response(),
            GatewayError::RouteNotFound(_) => (
                status,
                Json(json!({
                    "success": false,
                    "message": message,
                    "service": "api-gateway",
                    "availableEndpoints": {
                        "health": "/health",
                        "registry": "/registry",
                        "proxy": "/api/<service>/*",
                        "dashboard": "/api/dashboard",
                        "search": "/api/search?q=",
                    },
                })),
            )
                .into_response(),
            GatewayError::Internal(ref detail) => {
                tracing::error!(error = %detail, "Internal gateway error");
                (
                    status,
                    Json(json!({
                        "success": false,
                        "message": "internal gateway error",
                        "service": "api-gateway",
                    })),
                )
                    .into_response()
            }
            GatewayError::Validation(_) | GatewayError::InvalidRequest(_) => (
                status,
                Json(json!({ "success": false, "message": message })),
            )
                .into_response(),
        }
    }
}
