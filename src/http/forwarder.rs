//! Request forwarding to registered services.
//!
//! # Responsibilities
//! - Fail fast while a service's circuit is open
//! - Resolve the service through the registry
//! - Re-issue the request with a bounded timeout and relay the answer
//! - Report the outcome to the circuit breaker
//!
//! # Design Decisions
//! - Unreachable (refused, reset, timed out, truncated body) counts as a
//!   breaker failure
//! - Any complete answer, including 4xx/5xx, counts as success and is relayed
//!   as-is
//! - The upstream body is buffered within the timeout; the relayed response
//!   is never cut short
//! - No retries; one inbound request is exactly one outbound request

use std::error::Error as StdError;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri},
    response::Response,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;

use crate::error::GatewayError;
use crate::http::request::X_REQUEST_ID;
use crate::http::response::{outbound_headers, strip_hop_by_hop, GATEWAY_NAME};
use crate::registry::ServiceRegistry;
use crate::resilience::CircuitBreakers;

/// One inbound request, already resolved to a service and upstream path.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub service: String,
    pub method: Method,
    /// Path on the service.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: Option<SocketAddr>,
    pub request_id: String,
}

impl ForwardRequest {
    fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        }
    }
}

pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    registry: ServiceRegistry,
    breakers: CircuitBreakers,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(registry: ServiceRegistry, breakers: CircuitBreakers, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            registry,
            breakers,
            timeout,
        }
    }

    pub async fn forward(&self, req: ForwardRequest) -> Result<Response, GatewayError> {
        let service = req.service.clone();

        if self.breakers.is_open(&service) {
            tracing::warn!(request_id = %req.request_id, service = %service, "Circuit open, failing fast");
            return Err(GatewayError::CircuitOpen { service });
        }
        // Released on every exit that does not report an outcome.
        let trial = self.breakers.trial_guard(&req.service);

        let record = self.registry.discover(&service).map_err(|e| {
            let available = self.registry.names();
            tracing::warn!(
                request_id = %req.request_id,
                error = %e,
                available = ?available,
                "Service discovery failed"
            );
            GatewayError::ServiceNotFound {
                service: service.clone(),
                available,
            }
        })?;

        let target = record.url_for(&req.path_and_query());
        let uri: Uri = target
            .parse()
            .map_err(|e| GatewayError::Internal(format!("bad upstream uri '{}': {}", target, e)))?;
        let outbound = self.build_request(&req, uri)?;

        tracing::debug!(
            request_id = %req.request_id,
            service = %service,
            method = %req.method,
            target = %target,
            "Forwarding request"
        );

        // Headers and body both arrive inside the deadline.
        let exchange = async {
            let response = self
                .client
                .request(outbound)
                .await
                .map_err(|e| (error_code(&e), e.to_string()))?;
            let (parts, body) = response.into_parts();
            let bytes = axum::body::to_bytes(Body::new(body), usize::MAX)
                .await
                .map_err(|e| ("ECONNRESET", format!("response body interrupted: {}", e)))?;
            Ok::<_, (&'static str, String)>((parts, bytes))
        };

        match time::timeout(self.timeout, exchange).await {
            Ok(Ok((mut parts, bytes))) => {
                self.breakers.record_success(&service);
                trial.disarm();
                strip_hop_by_hop(&mut parts.headers);
                tracing::debug!(request_id = %req.request_id, service = %service, status = %parts.status, "Upstream responded");
                Ok(Response::from_parts(parts, Body::from(bytes)))
            }
            Ok(Err((code, detail))) => {
                tracing::error!(request_id = %req.request_id, service = %service, code, error = %detail, "Upstream error");
                self.breakers.record_failure(&service);
                trial.disarm();
                Err(GatewayError::UpstreamUnavailable { service, code, detail })
            }
            Err(_) => {
                tracing::error!(
                    request_id = %req.request_id,
                    service = %service,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Upstream timed out"
                );
                self.breakers.record_failure(&service);
                trial.disarm();
                Err(GatewayError::UpstreamUnavailable {
                    service,
                    code: "ETIMEDOUT",
                    detail: format!("no response within {:?}", self.timeout),
                })
            }
        }
    }

    fn build_request(&self, req: &ForwardRequest, uri: Uri) -> Result<Request<Body>, GatewayError> {
        let mut builder = Request::builder().method(req.method.clone()).uri(uri);

        if let Some(headers) = builder.headers_mut() {
            let forwarded_host = req.headers.get(axum::http::header::HOST).cloned();
            *headers = outbound_headers(&req.headers);

            if let Ok(id) = HeaderValue::from_str(&req.request_id) {
                headers.insert(X_REQUEST_ID, id);
            }
            if let Some(host) = forwarded_host {
                headers.insert(HeaderName::from_static("x-forwarded-host"), host);
            }
            if let Some(addr) = req.client_addr {
                append_forwarded_for(headers, addr);
            }
            headers.insert(
                HeaderName::from_static("x-forwarded-by"),
                HeaderValue::from_static(GATEWAY_NAME),
            );
        }

        builder
            .body(Body::from(req.body.clone()))
            .map_err(|e| GatewayError::Internal(format!("failed to build upstream request: {}", e)))
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let name = HeaderName::from_static("x-forwarded-for");
    let value = match headers.get(&name).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, addr.ip()),
        None => addr.ip().to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}

/// Map a client error to a short errno-style code.
fn error_code(err: &hyper_util::client::legacy::Error) -> &'static str {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return match io.kind() {
                ErrorKind::ConnectionRefused => "ECONNREFUSED",
                ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof => "ECONNRESET",
                ErrorKind::TimedOut => "ETIMEDOUT",
                _ => "EIO",
            };
        }
        if let Some(h) = e.downcast_ref::<hyper::Error>() {
            if h.is_incomplete_message() || h.is_closed() || h.is_canceled() {
                return "ECONNRESET";
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::CircuitBreakerConfig;
    use crate::registry::ServiceRecord;
    use crate::resilience::ManualClock;

    fn request(service: &str) -> ForwardRequest {
        ForwardRequest {
            service: service.into(),
            method: Method::GET,
            path: "/".into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            client_addr: None,
            request_id: "id".into(),
        }
    }

    /// Forwarder whose breaker for `service` is half-open.
    fn half_open(service: &str, registry: ServiceRegistry) -> (Forwarder, CircuitBreakers) {
        let clock = Arc::new(ManualClock::new());
        let config = CircuitBreakerConfig {
            failure_threshold: 3,
            cooldown_secs: 30,
        };
        let breakers = CircuitBreakers::with_clock(&config, clock.clone());
        for _ in 0..3 {
            breakers.record_failure(service);
        }
        clock.advance(Duration::from_secs(30));
        let forwarder = Forwarder::new(registry, breakers.clone(), Duration::from_secs(10));
        (forwarder, breakers)
    }

    #[tokio::test]
    async fn trial_is_released_when_discovery_fails() {
        let (forwarder, breakers) = half_open("ghost", ServiceRegistry::new());

        let result = forwarder.forward(request("ghost")).await;
        assert!(matches!(result, Err(GatewayError::ServiceNotFound { .. })));

        assert!(!breakers.is_open("ghost"), "next caller gets the trial");
        assert_eq!(breakers.failure_count("ghost"), 3);
    }

    #[tokio::test]
    async fn trial_is_released_when_the_caller_goes_away() {
        // Accepts into the backlog but never answers.
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registry = ServiceRegistry::new();
        registry.register(ServiceRecord::new("slow", format!("http://{}", silent.local_addr().unwrap())));
        let (forwarder, breakers) = half_open("slow", registry);

        let dropped = time::timeout(Duration::from_millis(100), forwarder.forward(request("slow"))).await;
        assert!(dropped.is_err());

        assert!(!breakers.is_open("slow"));
        assert_eq!(breakers.failure_count("slow"), 3);
    }

    #[test]
    fn query_is_appended_verbatim() {
        let req = ForwardRequest {
            service: "svc".into(),
            method: Method::GET,
            path: "/items".into(),
            query: Some("limit=5&q=a%20b".into()),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            client_addr: None,
            request_id: "id".into(),
        };
        assert_eq!(req.path_and_query(), "/items?limit=5&q=a%20b");
    }

    #[test]
    fn forwarded_for_is_appended() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        append_forwarded_for(&mut headers, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(headers["x-forwarded-for"], "10.0.0.1, 127.0.0.1");
    }
}
