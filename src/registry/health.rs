//! Active health checking of registered services.
//!
//! # Responsibilities
//! - Periodically probe every registered service
//! - Update `healthy` / `last_checked_at` in the registry
//!
//! # Design Decisions
//! - Probes of one round run concurrently, each under its own timeout, so a
//!   hung service cannot hold back the next round
//! - Probe failures only change state; they are never propagated
//! - A result is dropped if the service re-registered at another address
//!   during the round
//! - The loop stops on the lifecycle shutdown broadcast

use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::registry::record::ServiceRecord;
use crate::registry::store::ServiceRegistry;

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub service: String,
    /// Address that was probed.
    pub base_url: String,
    pub healthy: bool,
}

pub struct HealthChecker {
    registry: ServiceRegistry,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthChecker {
    pub fn new(registry: ServiceRegistry, config: HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            registry,
            config,
            client,
        }
    }

    /// Run the periodic loop on its own task.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health checker starting"
        );

        let start = time::Instant::now() + Duration::from_secs(self.config.initial_delay_secs);
        let mut ticker = time::interval_at(start, Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.perform_health_checks().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health checker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every registered service once and record the results.
    pub async fn perform_health_checks(&self) -> Vec<ProbeResult> {
        let services = self.registry.list_services();
        let probes = services.into_values().map(|record| async move {
            let healthy = self.probe(&record).await;
            ProbeResult {
                service: record.name,
                base_url: record.base_url,
                healthy,
            }
        });

        let results = join_all(probes).await;
        for result in &results {
            self.registry
                .update_health_at(&result.service, &result.base_url, result.healthy);
        }

        tracing::debug!(
            checked = results.len(),
            healthy = results.iter().filter(|r| r.healthy).count(),
            "Health check round complete"
        );
        results
    }

    async fn probe(&self, record: &ServiceRecord) -> bool {
        let uri = record.url_for(&self.config.path);
        let request = match Request::builder()
            .method("GET")
            .uri(&uri)
            .header("user-agent", "service-gateway-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(service = %record.name, uri = %uri, "Failed to build health check request: {}", e);
                return false;
            }
        };

        let timeout = Duration::from_secs(self.config.timeout_secs);
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(service = %record.name, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(service = %record.name, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(service = %record.name, "Health check failed: timeout");
                false
            }
        }
    }
}
