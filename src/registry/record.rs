//! Registry entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// One registered backend service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub name: String,
    /// Scheme, host and port; paths are appended when forwarding.
    pub base_url: String,
    pub healthy: bool,
    pub last_checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Informational only (endpoints, database, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ServiceRecord {
    /// A freshly registered record, assumed healthy.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            healthy: true,
            last_checked_at: Utc::now(),
            version: None,
            metadata: Map::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Absolute URL for `path_and_query` on this service.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }
}

/// Body of a self-registration call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Registration {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            version: None,
            metadata: Map::new(),
        }
    }

    /// Check the URL and build the record for `name`.
    pub fn into_record(self, name: &str) -> Result<ServiceRecord, String> {
        let parsed = Url::parse(&self.url).map_err(|e| format!("invalid url '{}': {}", self.url, e))?;
        if parsed.scheme() != "http" {
            return Err(format!("unsupported scheme '{}', only http is forwarded", parsed.scheme()));
        }
        if parsed.host_str().is_none() {
            return Err(format!("url '{}' has no host", self.url));
        }
        if name.trim().is_empty() {
            return Err("service name must not be empty".to_string());
        }

        let mut record = ServiceRecord::new(name, self.url);
        record.version = self.version;
        record.metadata = self.metadata;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let record = ServiceRecord::new("svc", "http://127.0.0.1:9001/");
        assert_eq!(record.url_for("/items?limit=5"), "http://127.0.0.1:9001/items?limit=5");
    }

    #[test]
    fn registration_rejects_non_http_urls() {
        assert!(Registration::new("ftp://host:21").into_record("svc").is_err());
        assert!(Registration::new("not a url").into_record("svc").is_err());

        let mut reg = Registration::new("http://localhost:3001");
        reg.version = Some("1.0.0".into());
        let record = reg.into_record("user-service").unwrap();
        assert_eq!(record.name, "user-service");
        assert_eq!(record.version.as_deref(), Some("1.0.0"));
        assert!(record.healthy);
    }
}
