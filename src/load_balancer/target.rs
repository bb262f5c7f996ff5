//! Balancer target abstraction.
//!
//! # Responsibilities
//! - Represent a single `host:port` destination
//! - Carry the time of its most recent connection failure

use std::fmt;
use std::time::{Duration, Instant};

/// A single TCP destination of the balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalancerTarget {
    pub host: String,
    pub port: u16,
    /// Last connection failure; `None` while the target is in rotation.
    pub failed_at: Option<Instant>,
}

impl BalancerTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            failed_at: None,
        }
    }

    /// Parse `host:port`. Returns `None` for a missing host or invalid port.
    pub fn parse(s: &str) -> Option<Self> {
        let (host, port) = s.trim().rsplit_once(':')?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return None;
        }
        let port: u16 = port.parse().ok()?;
        if port == 0 {
            return None;
        }
        Some(Self::new(host, port))
    }

    /// Address suitable for `TcpStream::connect`.
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Whether the target may be selected at `now`.
    pub fn is_eligible(&self, now: Instant, cooldown: Duration) -> bool {
        match self.failed_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= cooldown,
        }
    }
}

impl fmt::Display for BalancerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr())
    }
}
