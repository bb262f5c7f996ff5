//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: service assumed down, requests fail fast
//! - Half-Open: cooldown elapsed, a single trial request is let through
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold (consecutive failures)
//! Open → Half-Open: now - last_failure_at >= cooldown (checked lazily)
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails (last_failure_at restamped)
//! ```
//!
//! # Design Decisions
//! - Per-target breaker (keyed by service name), no shared state between targets
//! - State is computed by [`evaluate`] from the stored counters and `now`;
//!   nothing flips on a timer
//! - Only unreachable targets count as failures; a backend that answers with
//!   any status is reachable and resets its breaker

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::clock::{Clock, SystemClock};

/// Observable state of one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Stored bookkeeping for one target. Created on the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerEntry {
    pub failure_count: u32,
    pub last_failure_at: Instant,
    /// Set when a half-open trial has been handed out and not yet resolved.
    pub trial_started_at: Option<Instant>,
}

/// Compute the breaker state at `now`.
pub fn evaluate(entry: &BreakerEntry, now: Instant, threshold: u32, cooldown: Duration) -> CircuitState {
    if entry.failure_count < threshold {
        return CircuitState::Closed;
    }
    if now.saturating_duration_since(entry.last_failure_at) < cooldown {
        return CircuitState::Open;
    }
    match entry.trial_started_at {
        // A trial is in flight; hold everything else back until it reports.
        Some(started) if now.saturating_duration_since(started) < cooldown => CircuitState::Open,
        _ => CircuitState::HalfOpen,
    }
}

/// Diagnostic view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub target: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub is_open: bool,
    /// Milliseconds since the most recent failure.
    pub last_failure_ms_ago: u64,
}

/// The set of breakers owned by the gateway, one per target.
#[derive(Debug, Clone)]
pub struct CircuitBreakers {
    entries: Arc<DashMap<String, BreakerEntry>>,
    failure_threshold: u32,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakers {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            failure_threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
            clock,
        }
    }

    /// Whether calls to `target` must fail fast.
    ///
    /// In the half-open state this returns `false` exactly once and marks the
    /// caller's request as the trial.
    pub fn is_open(&self, target: &str) -> bool {
        let now = self.clock.now();
        let Some(mut entry) = self.entries.get_mut(target) else {
            return false;
        };

        match evaluate(&entry, now, self.failure_threshold, self.cooldown) {
            CircuitState::Closed => false,
            CircuitState::Open => true,
            CircuitState::HalfOpen => {
                entry.trial_started_at = Some(now);
                tracing::info!(target = %target, "Circuit breaker half-open, allowing trial request");
                false
            }
        }
    }

    /// Hand a granted half-open trial back without an outcome, so the next
    /// caller becomes the trial instead of waiting out another cooldown.
    pub fn release_trial(&self, target: &str) {
        if let Some(mut entry) = self.entries.get_mut(target) {
            if entry.trial_started_at.take().is_some() {
                tracing::debug!(target = %target, "Trial request released without outcome");
            }
        }
    }

    /// Guard that releases the trial for `target` unless disarmed.
    ///
    /// Covers early returns and dropped futures between [`Self::is_open`] and
    /// the outcome report.
    pub fn trial_guard<'a>(&'a self, target: &'a str) -> TrialGuard<'a> {
        TrialGuard {
            breakers: self,
            target,
            armed: true,
        }
    }

    /// Record a transport-level failure of a call to `target`.
    pub fn record_failure(&self, target: &str) {
        let now = self.clock.now();
        let mut entry = self.entries.entry(target.to_string()).or_insert(BreakerEntry {
            failure_count: 0,
            last_failure_at: now,
            trial_started_at: None,
        });

        let was_trial = entry.trial_started_at.take().is_some();
        entry.failure_count = entry.failure_count.saturating_add(1);
        entry.last_failure_at = now;

        if entry.failure_count == self.failure_threshold {
            tracing::warn!(
                target = %target,
                failures = entry.failure_count,
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit breaker opened"
            );
            metrics::record_circuit_state(target, true);
        } else if was_trial {
            tracing::warn!(target = %target, "Trial request failed, circuit breaker re-opened");
        } else {
            tracing::debug!(target = %target, failures = entry.failure_count, "Failure recorded");
        }
    }

    /// Record that `target` answered. Resets its breaker to closed.
    pub fn record_success(&self, target: &str) {
        if let Some((_, entry)) = self.entries.remove(target) {
            if entry.failure_count >= self.failure_threshold {
                tracing::info!(target = %target, "Circuit breaker reset");
                metrics::record_circuit_state(target, false);
            }
        }
    }

    /// Current state without granting a trial.
    pub fn state(&self, target: &str) -> CircuitState {
        let now = self.clock.now();
        self.entries
            .get(target)
            .map(|entry| evaluate(&entry, now, self.failure_threshold, self.cooldown))
            .unwrap_or(CircuitState::Closed)
    }

    /// Consecutive failures recorded for `target` (0 when unknown).
    pub fn failure_count(&self, target: &str) -> u32 {
        self.entries.get(target).map(|e| e.failure_count).unwrap_or(0)
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Every breaker with recorded failures, sorted by target.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let now = self.clock.now();
        let mut snapshots: Vec<_> = self
            .entries
            .iter()
            .map(|item| {
                let entry = item.value();
                CircuitSnapshot {
                    target: item.key().clone(),
                    state: evaluate(entry, now, self.failure_threshold, self.cooldown),
                    failure_count: entry.failure_count,
                    is_open: entry.failure_count >= self.failure_threshold,
                    last_failure_ms_ago: now
                        .saturating_duration_since(entry.last_failure_at)
                        .as_millis() as u64,
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.target.cmp(&b.target));
        snapshots
    }
}

/// See [`CircuitBreakers::trial_guard`].
#[must_use = "dropping the guard releases the trial immediately"]
pub struct TrialGuard<'a> {
    breakers: &'a CircuitBreakers,
    target: &'a str,
    armed: bool,
}

impl TrialGuard<'_> {
    /// The outcome was reported; keep the breaker as it is.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breakers.release_trial(self.target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;

    fn breakers() -> (CircuitBreakers, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = CircuitBreakerConfig {
            failure_threshold: 3,
            cooldown_secs: 30,
        };
        (CircuitBreakers::with_clock(&config, clock.clone()), clock)
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let (cb, _) = breakers();

        cb.record_failure("svc");
        cb.record_failure("svc");
        assert!(!cb.is_open("svc"));

        cb.record_failure("svc");
        assert!(cb.is_open("svc"));
        assert_eq!(cb.state("svc"), CircuitState::Open);
    }

    #[test]
    fn unknown_target_is_closed() {
        let (cb, _) = breakers();
        assert!(!cb.is_open("never-seen"));
        assert_eq!(cb.failure_count("never-seen"), 0);
    }

    #[test]
    fn half_open_after_cooldown_allows_exactly_one_trial() {
        let (cb, clock) = breakers();
        for _ in 0..3 {
            cb.record_failure("svc");
        }

        clock.advance(Duration::from_secs(29));
        assert!(cb.is_open("svc"));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cb.state("svc"), CircuitState::HalfOpen);
        assert!(!cb.is_open("svc"), "first check after cooldown is the trial");
        assert!(cb.is_open("svc"), "second caller waits for the trial");
    }

    #[test]
    fn failed_trial_reopens_for_a_full_cooldown() {
        let (cb, clock) = breakers();
        for _ in 0..3 {
            cb.record_failure("svc");
        }
        clock.advance(Duration::from_secs(30));
        assert!(!cb.is_open("svc"));

        cb.record_failure("svc");
        assert!(cb.is_open("svc"));

        clock.advance(Duration::from_secs(29));
        assert!(cb.is_open("svc"));
        clock.advance(Duration::from_secs(1));
        assert!(!cb.is_open("svc"));
    }

    #[test]
    fn success_resets_after_any_number_of_failures() {
        let (cb, _) = breakers();
        for _ in 0..7 {
            cb.record_failure("svc");
        }
        assert!(cb.is_open("svc"));

        cb.record_success("svc");
        assert_eq!(cb.failure_count("svc"), 0);
        assert!(!cb.is_open("svc"));
        assert_eq!(cb.state("svc"), CircuitState::Closed);
    }

    #[test]
    fn success_between_failures_restarts_the_count() {
        let (cb, _) = breakers();
        cb.record_failure("svc");
        cb.record_failure("svc");
        cb.record_success("svc");
        cb.record_failure("svc");
        cb.record_failure("svc");
        assert!(!cb.is_open("svc"));
    }

    #[test]
    fn stale_trial_is_handed_out_again() {
        let (cb, clock) = breakers();
        for _ in 0..3 {
            cb.record_failure("svc");
        }
        clock.advance(Duration::from_secs(30));
        assert!(!cb.is_open("svc"));

        // Trial never reported back.
        clock.advance(Duration::from_secs(30));
        assert!(!cb.is_open("svc"));
    }

    #[test]
    fn released_trial_is_handed_to_the_next_caller() {
        let (cb, clock) = breakers();
        for _ in 0..3 {
            cb.record_failure("svc");
        }
        clock.advance(Duration::from_secs(30));
        assert!(!cb.is_open("svc"));

        clock.advance(Duration::from_secs(10));
        assert!(cb.is_open("svc"), "trial still outstanding");

        cb.release_trial("svc");
        assert!(!cb.is_open("svc"), "next caller takes over the trial");
        assert!(cb.is_open("svc"));
        assert_eq!(cb.failure_count("svc"), 3);
    }

    #[test]
    fn dropped_trial_guard_releases_the_trial() {
        let (cb, clock) = breakers();
        for _ in 0..3 {
            cb.record_failure("svc");
        }
        clock.advance(Duration::from_secs(30));

        {
            assert!(!cb.is_open("svc"));
            let _guard = cb.trial_guard("svc");
        }
        assert!(!cb.is_open("svc"));

        let guard = cb.trial_guard("svc");
        cb.record_failure("svc");
        guard.disarm();
        clock.advance(Duration::from_secs(10));
        assert!(cb.is_open("svc"), "failed trial re-opened the circuit");
    }

    #[test]
    fn release_without_trial_is_a_no_op() {
        let (cb, _) = breakers();
        cb.release_trial("never-seen");
        cb.record_failure("svc");
        cb.release_trial("svc");
        assert_eq!(cb.failure_count("svc"), 1);
        assert_eq!(cb.state("svc"), CircuitState::Closed);
    }

    #[test]
    fn targets_are_independent() {
        let (cb, _) = breakers();
        for _ in 0..3 {
            cb.record_failure("a");
        }
        assert!(cb.is_open("a"));
        assert!(!cb.is_open("b"));

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].target, "a");
        assert!(snapshot[0].is_open);
    }

    #[test]
    fn evaluate_is_pure() {
        let t0 = Instant::now();
        let entry = BreakerEntry {
            failure_count: 3,
            last_failure_at: t0,
            trial_started_at: None,
        };
        let cooldown = Duration::from_secs(30);

        assert_eq!(evaluate(&entry, t0, 3, cooldown), CircuitState::Open);
        assert_eq!(evaluate(&entry, t0 + cooldown, 3, cooldown), CircuitState::HalfOpen);
        assert_eq!(evaluate(&entry, t0 + cooldown, 4, cooldown), CircuitState::Closed);
    }
}
