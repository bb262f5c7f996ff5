//! Client side of the registration protocol.
//!
//! Backend services running in their own process use this to register with a
//! gateway on startup, report liveness, and unregister on shutdown.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::registry::record::{Registration, ServiceRecord};

#[derive(Debug, Error)]
pub enum RegistryClientError {
    #[error("request to gateway failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway rejected the call with {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Talks to the registry endpoints of a remote gateway.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    gateway_url: String,
    client: reqwest::Client,
}

impl RegistryClient {
    pub fn new(gateway_url: impl Into<String>) -> Self {
        let gateway_url: String = gateway_url.into();
        Self {
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        }
    }

    pub async fn register(
        &self,
        name: &str,
        registration: &Registration,
    ) -> Result<ServiceRecord, RegistryClientError> {
        let res = self
            .client
            .post(format!("{}/registry/{}", self.gateway_url, name))
            .json(registration)
            .send()
            .await?;
        let body = Self::check(res).await?;
        let record = serde_json::from_value(body["data"].clone()).map_err(|e| {
            RegistryClientError::Rejected {
                status: 200,
                message: format!("unexpected registration response: {}", e),
            }
        })?;
        Ok(record)
    }

    pub async fn unregister(&self, name: &str) -> Result<(), RegistryClientError> {
        let res = self
            .client
            .delete(format!("{}/registry/{}", self.gateway_url, name))
            .send()
            .await?;
        Self::check(res).await.map(|_| ())
    }

    /// Mark `name` healthy on the gateway.
    pub async fn heartbeat(&self, name: &str) -> Result<(), RegistryClientError> {
        let res = self
            .client
            .post(format!("{}/registry/{}/heartbeat", self.gateway_url, name))
            .send()
            .await?;
        Self::check(res).await.map(|_| ())
    }

    /// Send heartbeats every `interval` until shutdown.
    pub fn spawn_heartbeat(
        &self,
        name: impl Into<String>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let client = self.clone();
        let name = name.into();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately; registration already reported health.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = client.heartbeat(&name).await {
                            tracing::warn!(service = %name, error = %e, "Heartbeat failed");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }

    async fn check(res: reqwest::Response) -> Result<Value, RegistryClientError> {
        let status = res.status();
        let body: Value = res.json().await.unwrap_or(Value::Null);
        if status.is_success() {
            Ok(body)
        } else {
            Err(RegistryClientError::Rejected {
                status: status.as_u16(),
                message: body["message"].as_str().unwrap_or("unknown error").to_string(),
            })
        }
    }
}
