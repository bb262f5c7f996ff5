//! Aggregation endpoints.
//!
//! # Responsibilities
//! - Fan a single client request out to several services concurrently
//! - Report each slice as available or not, never failing the whole response
//! - Serve `GET /api/dashboard` and `GET /api/search`
//!
//! # Design Decisions
//! - Slices come from `AggregationConfig`, swapped on hot reload
//! - Each slice is attempted once, bounded by the aggregation timeout
//! - Slices bypass the circuit breaker; they report, they do not trip

use std::collections::HashMap;
use std::error::Error as StdError;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::AggregateQuery;
use crate::error::GatewayError;
use crate::http::request::{request_id_or_new, X_REQUEST_ID};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::registry::ServiceRegistry;

/// Outcome of one dashboard slice.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SliceOutcome {
    pub available: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

/// Outcome of one search slice.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchOutcome {
    pub available: bool,
    pub results: Value,
    pub error: Option<String>,
}

/// Issues the sub-queries of an aggregate request.
#[derive(Debug, Clone)]
pub struct Aggregator {
    registry: ServiceRegistry,
    client: reqwest::Client,
}

impl Aggregator {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            client: reqwest::Client::new(),
        }
    }

    /// Call one service and return its payload (`data` field when present).
    pub async fn call_service(
        &self,
        query: &AggregateQuery,
        extra: &[(&str, &str)],
        authorization: Option<&str>,
        request_id: &str,
        timeout: Duration,
    ) -> Result<Value, GatewayError> {
        let record = self
            .registry
            .discover(&query.service)
            .map_err(|_| GatewayError::ServiceNotFound {
                service: query.service.clone(),
                available: self.registry.names(),
            })?;

        let mut req = self
            .client
            .get(record.url_for(&query.path))
            .timeout(timeout)
            .header(X_REQUEST_ID, request_id)
            .query(&query.query)
            .query(extra);
        if let (true, Some(auth)) = (query.forward_auth, authorization) {
            req = req.header(header::AUTHORIZATION.as_str(), auth);
        }

        let res = req.send().await.map_err(|e| GatewayError::UpstreamUnavailable {
            service: query.service.clone(),
            code: request_error_code(&e),
            detail: e.to_string(),
        })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.bytes().await.unwrap_or_default();
            return Err(GatewayError::UpstreamApplication {
                service: query.service.clone(),
                status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                body,
            });
        }

        let body: Value = res.json().await.map_err(|e| GatewayError::UpstreamUnavailable {
            service: query.service.clone(),
            code: if e.is_timeout() { "ETIMEDOUT" } else { "EBADBODY" },
            detail: e.to_string(),
        })?;

        Ok(match body {
            Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
            other => other,
        })
    }

    /// Run every applicable slice concurrently, preserving plan order.
    ///
    /// Slices marked `requires_auth` are skipped when no `Authorization`
    /// header was sent.
    pub async fn fan_out(
        &self,
        plan: &[AggregateQuery],
        extra: &[(&str, &str)],
        authorization: Option<&str>,
        request_id: &str,
        timeout: Duration,
    ) -> Vec<(String, Result<Value, GatewayError>)> {
        let slices: Vec<&AggregateQuery> = plan
            .iter()
            .filter(|q| !q.requires_auth || authorization.is_some())
            .collect();

        let calls = slices
            .iter()
            .map(|q| self.call_service(q, extra, authorization, request_id, timeout));
        let results = join_all(calls).await;

        slices
            .into_iter()
            .zip(results)
            .map(|(q, result)| {
                if let Err(e) = &result {
                    tracing::warn!(
                        request_id = %request_id,
                        slice = %q.key,
                        service = %q.service,
                        error = %e,
                        "Aggregate slice unavailable"
                    );
                }
                (q.key.clone(), result)
            })
            .collect()
    }
}

fn slice_outcome(result: Result<Value, GatewayError>) -> SliceOutcome {
    match result {
        Ok(data) => SliceOutcome {
            available: true,
            data: Some(data),
            error: None,
        },
        Err(e) => SliceOutcome {
            available: false,
            data: None,
            error: Some(e.to_string()),
        },
    }
}

fn search_outcome(result: Result<Value, GatewayError>) -> SearchOutcome {
    match result {
        Ok(Value::Object(mut map)) => SearchOutcome {
            available: true,
            results: map.remove("results").unwrap_or_else(|| json!([])),
            error: None,
        },
        Ok(list @ Value::Array(_)) => SearchOutcome {
            available: true,
            results: list,
            error: None,
        },
        Ok(_) => SearchOutcome {
            available: true,
            results: json!([]),
            error: None,
        },
        Err(e) => SearchOutcome {
            available: false,
            results: json!([]),
            error: Some(e.to_string()),
        },
    }
}

/// Short errno-style code for a failed sub-call.
fn request_error_code(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        return "ETIMEDOUT";
    }
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            match io.kind() {
                ErrorKind::ConnectionRefused => return "ECONNREFUSED",
                ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof => return "ECONNRESET",
                _ => {}
            }
        }
        source = e.source();
    }

    if err.is_connect() {
        "ECONNREFUSED"
    } else {
        "EUPSTREAM"
    }
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// `GET /api/dashboard`
pub async fn dashboard(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let start = Instant::now();
    let request_id = request_id_or_new(&headers);
    let plan = state.aggregation.load_full();

    let slices = state
        .aggregator
        .fan_out(&plan.dashboard, &[], authorization(&headers), &request_id, plan.timeout())
        .await;

    let data: serde_json::Map<String, Value> = slices
        .into_iter()
        .map(|(key, result)| (key, json!(slice_outcome(result))))
        .collect();

    tracing::debug!(request_id = %request_id, slices = data.len(), "Dashboard aggregated");
    metrics::record_request("GET", 200, "dashboard", start);

    Json(json!({
        "success": true,
        "data": {
            "timestamp": Utc::now(),
            "services_status": state.registry.list_services(),
            "data": data,
        }
    }))
    .into_response()
}

/// `GET /api/search?q=`
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let start = Instant::now();
    let q = params
        .get("q")
        .map(String::as_str)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| GatewayError::Validation("query parameter 'q' is required".to_string()))?;

    let request_id = request_id_or_new(&headers);
    let plan = state.aggregation.load_full();

    let slices = state
        .aggregator
        .fan_out(&plan.search, &[("q", q)], authorization(&headers), &request_id, plan.timeout())
        .await;

    let mut data = serde_json::Map::new();
    data.insert("query".to_string(), json!(q));
    for (key, result) in slices {
        data.insert(key, json!(search_outcome(result)));
    }

    metrics::record_request("GET", 200, "search", start);
    Ok(Json(json!({ "success": true, "data": data })).into_response())
}
