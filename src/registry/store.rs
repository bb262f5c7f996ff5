//! In-memory service directory.
//!
//! # Design Decisions
//! - One record per name; registering an existing name replaces it
//!   (last writer wins, no versioning)
//! - Every mutation is a single `DashMap` call, so readers never see a
//!   half-updated record
//! - `discover` does not filter on health; callers decide what to trust

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;

use crate::observability::metrics;
use crate::registry::record::ServiceRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("service '{0}' is not registered")]
    NotFound(String),
}

/// Process-wide directory of backend services.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<DashMap<String, ServiceRecord>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record keyed by `record.name`.
    pub fn register(&self, record: ServiceRecord) {
        tracing::info!(
            service = %record.name,
            url = %record.base_url,
            version = record.version.as_deref().unwrap_or("-"),
            "Service registered"
        );
        metrics::record_service_health(&record.name, record.healthy);
        self.services.insert(record.name.clone(), record);
    }

    /// Remove a record. Returns whether one existed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.services.remove(name).is_some();
        if removed {
            tracing::info!(service = %name, "Service unregistered");
        }
        removed
    }

    pub fn discover(&self, name: &str) -> Result<ServiceRecord, RegistryError> {
        self.services
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Snapshot of every record, ordered by name.
    pub fn list_services(&self) -> BTreeMap<String, ServiceRecord> {
        self.services
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.services.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Set health and refresh the check timestamp. Unknown names are ignored.
    pub fn update_health(&self, name: &str, healthy: bool) {
        self.apply_health(name, None, healthy);
    }

    /// Like [`Self::update_health`], but only while `name` is still
    /// registered at `base_url`. Returns whether the record was updated.
    ///
    /// A probe result must not land on a record re-registered elsewhere
    /// while the probe was in flight.
    pub fn update_health_at(&self, name: &str, base_url: &str, healthy: bool) -> bool {
        self.apply_health(name, Some(base_url), healthy)
    }

    fn apply_health(&self, name: &str, base_url: Option<&str>, healthy: bool) -> bool {
        if let Some(mut record) = self.services.get_mut(name) {
            if base_url.is_some_and(|url| url != record.base_url) {
                tracing::debug!(service = %name, probed = ?base_url, current = %record.base_url, "Stale health result ignored");
                return false;
            }
            if record.healthy != healthy {
                if healthy {
                    tracing::info!(service = %name, "Service became healthy");
                } else {
                    tracing::warn!(service = %name, "Service became unhealthy");
                }
            }
            record.healthy = healthy;
            record.last_checked_at = Utc::now();
            metrics::record_service_health(name, healthy);
            true
        } else {
            tracing::debug!(service = %name, "Health update for unknown service ignored");
            false
        }
    }
}
