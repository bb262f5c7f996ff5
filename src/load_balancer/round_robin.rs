//! Round-robin load balancing strategy.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::load_balancer::{target::BalancerTarget, LoadBalancer};
use crate::observability::metrics;
use crate::resilience::{Clock, SystemClock};

#[derive(Debug)]
struct Rotation {
    targets: Vec<BalancerTarget>,
    cursor: usize,
}

/// Round-robin selector.
/// Rotates a cursor over the targets, skipping those still cooling down
/// after a connection failure.
#[derive(Debug)]
pub struct RoundRobin {
    rotation: Mutex<Rotation>,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl RoundRobin {
    pub fn new(targets: Vec<BalancerTarget>, cooldown: Duration) -> Self {
        Self::with_clock(targets, cooldown, Arc::new(SystemClock))
    }

    pub fn with_clock(targets: Vec<BalancerTarget>, cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            rotation: Mutex::new(Rotation { targets, cursor: 0 }),
            cooldown,
            clock,
        }
    }

    /// Addresses of every target, in rotation order.
    pub fn targets(&self) -> Vec<String> {
        let rotation = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        rotation.targets.iter().map(BalancerTarget::addr).collect()
    }

    /// Addresses of targets currently excluded from selection.
    pub fn cooling_down(&self) -> Vec<String> {
        let now = self.clock.now();
        let rotation = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        rotation
            .targets
            .iter()
            .filter(|t| !t.is_eligible(now, self.cooldown))
            .map(BalancerTarget::addr)
            .collect()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_target(&self) -> Option<BalancerTarget> {
        let now = self.clock.now();
        let mut rotation = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        let len = rotation.targets.len();
        if len == 0 {
            return None;
        }

        for i in 0..len {
            let index = (rotation.cursor + i) % len;
            if rotation.targets[index].is_eligible(now, self.cooldown) {
                rotation.targets[index].failed_at = None;
                rotation.cursor = (index + 1) % len;
                return Some(rotation.targets[index].clone());
            }
        }

        // Everything is cooling down: fail open rather than refuse the client.
        tracing::warn!(targets = len, "All balancer targets failed recently, resetting cooldowns");
        for target in rotation.targets.iter_mut() {
            target.failed_at = None;
        }
        rotation.cursor = 1 % len;
        Some(rotation.targets[0].clone())
    }

    fn mark_failed(&self, addr: &str) {
        let now = self.clock.now();
        let mut rotation = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(target) = rotation.targets.iter_mut().find(|t| t.addr() == addr) {
            target.failed_at = Some(now);
            tracing::warn!(
                target = %addr,
                cooldown_secs = self.cooldown.as_secs(),
                "Balancer target marked failed"
            );
            metrics::record_target_failure(addr);
        }
    }
}
