use crate::config::CircuitBreakerConfig;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Circuit breaker state machine: Closed → Open → HalfOpen → Closed/Open.
///
/// Per-service granularity — each downstream service name gets its own
/// breaker, created lazily on first use and kept for the process lifetime.
/// The registry is an owned component: callers hold it (usually behind an
/// `Arc`) and pass it where it is needed, so tests get full isolation.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<ServiceBreaker>>,
    config: CircuitBreakerConfig,
}

/// Per-service circuit breaker state.
struct ServiceBreaker {
    /// 0 = Closed, 1 = Open, 2 = HalfOpen.
    state: AtomicU8,
    /// Consecutive failure count (in Closed state).
    failure_count: AtomicU32,
    /// When the last failure was recorded. Guards the Open → HalfOpen
    /// transition together with the atomic state.
    last_failure: std::sync::Mutex<Option<Instant>>,
    config: CircuitBreakerConfig,
}

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Observable breaker state, for health/metrics reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// One registry entry as seen at a point in time.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub service: String,
    pub state: BreakerState,
    pub failure_count: u32,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Check whether a call to `service` may proceed.
    ///
    /// This is deliberately NOT a pure predicate: when an Open breaker's
    /// recovery timeout has elapsed, this check performs the Open → HalfOpen
    /// transition as a side effect. The check is the only recovery trigger —
    /// there is no background timer.
    pub fn can_execute(&self, service: &str) -> bool {
        self.get_or_create(service).can_execute()
    }

    /// Record a successful call: reset the failure count and force Closed.
    pub fn on_success(&self, service: &str) {
        self.get_or_create(service).on_success();
    }

    /// Record a failed call: bump the failure count, stamp the failure time,
    /// and trip to Open when the threshold is reached (or immediately when
    /// a HalfOpen probe fails).
    pub fn on_failure(&self, service: &str) {
        self.get_or_create(service).on_failure();
    }

    /// Current state of a service's breaker, without side effects.
    /// Services never referenced yet report Closed.
    pub fn state(&self, service: &str) -> BreakerState {
        match self.breakers.get(service) {
            Some(entry) => entry.value().current_state(),
            None => BreakerState::Closed,
        }
    }

    /// Consecutive failure count for a service's breaker.
    pub fn failure_count(&self, service: &str) -> u32 {
        match self.breakers.get(service) {
            Some(entry) => entry.value().failure_count.load(Ordering::Relaxed),
            None => 0,
        }
    }

    /// Point-in-time view of every breaker the registry has created, sorted
    /// by service name. Used by the admin surface and the state gauge.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut entries: Vec<BreakerSnapshot> = self
            .breakers
            .iter()
            .map(|entry| BreakerSnapshot {
                service: entry.key().clone(),
                state: entry.value().current_state(),
                failure_count: entry.value().failure_count.load(Ordering::Relaxed),
            })
            .collect();
        entries.sort_by(|a, b| a.service.cmp(&b.service));
        entries
    }

    fn get_or_create(&self, service: &str) -> Arc<ServiceBreaker> {
        // Fast path: key already exists — no allocation.
        if let Some(entry) = self.breakers.get(service) {
            return entry.value().clone();
        }
        // Slow path: allocate owned key only when inserting.
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(ServiceBreaker {
                    state: AtomicU8::new(STATE_CLOSED),
                    failure_count: AtomicU32::new(0),
                    last_failure: std::sync::Mutex::new(None),
                    config: self.config.clone(),
                })
            })
            .clone()
    }
}

impl ServiceBreaker {
    fn can_execute(&self) -> bool {
        let state = self.state.load(Ordering::Acquire);
        match state {
            STATE_CLOSED => true,
            STATE_OPEN => {
                let last_failure = self.last_failure.lock().unwrap();
                if let Some(at) = *last_failure {
                    if at.elapsed() >= self.config.recovery_timeout() {
                        drop(last_failure);
                        // CAS so that exactly one caller wins the transition
                        // to HalfOpen under concurrent checks.
                        if self
                            .state
                            .compare_exchange(
                                STATE_OPEN,
                                STATE_HALF_OPEN,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            )
                            .is_ok()
                        {
                            tracing::info!("circuit_breaker: half-open (recovery probe allowed)");
                        }
                        // Losers observe HalfOpen and are allowed through too,
                        // matching the all-permitted HalfOpen semantics below.
                        return true;
                    }
                }
                false
            }
            STATE_HALF_OPEN => true,
            _ => true,
        }
    }

    fn on_success(&self) {
        let prev = self.state.swap(STATE_CLOSED, Ordering::AcqRel);
        self.failure_count.store(0, Ordering::Relaxed);
        if prev != STATE_CLOSED {
            tracing::info!("circuit_breaker: closed (call succeeded)");
        }
    }

    fn on_failure(&self) {
        *self.last_failure.lock().unwrap() = Some(Instant::now());

        let state = self.state.load(Ordering::Acquire);
        match state {
            STATE_CLOSED => {
                let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                if count >= self.config.failure_threshold {
                    self.state.store(STATE_OPEN, Ordering::Release);
                    tracing::warn!(
                        "circuit_breaker: opened (after {} consecutive failures)",
                        count
                    );
                }
            }
            STATE_HALF_OPEN => {
                // Probe failed — back to Open.
                self.failure_count.fetch_add(1, Ordering::Relaxed);
                self.state.store(STATE_OPEN, Ordering::Release);
                tracing::warn!("circuit_breaker: re-opened (probe failed in half-open)");
            }
            _ => {
                self.failure_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn current_state(&self) -> BreakerState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => BreakerState::Open,
            STATE_HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(failure_threshold: u32, recovery_timeout_secs: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout_secs,
        }
    }

    #[test]
    fn starts_closed() {
        let reg = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());
        assert!(reg.can_execute("user"));
        assert_eq!(reg.state("user"), BreakerState::Closed);
        assert_eq!(reg.failure_count("user"), 0);
    }

    #[test]
    fn trips_after_threshold_failures() {
        let reg = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());

        // Default threshold is 5: four failures leave the breaker closed.
        for _ in 0..4 {
            assert!(reg.can_execute("user"));
            reg.on_failure("user");
        }
        assert_eq!(reg.state("user"), BreakerState::Closed);

        // Fifth failure trips it; default recovery timeout is 60s so the
        // next check is rejected immediately.
        reg.on_failure("user");
        assert_eq!(reg.state("user"), BreakerState::Open);
        assert!(!reg.can_execute("user"));
        assert_eq!(reg.failure_count("user"), 5);
    }

    #[test]
    fn success_resets_failure_count() {
        let reg = CircuitBreakerRegistry::new(config(3, 3600));

        reg.on_failure("user");
        reg.on_failure("user");
        reg.on_success("user");
        reg.on_failure("user");
        reg.on_failure("user");

        // Still closed — the success reset the counter.
        assert!(reg.can_execute("user"));
        assert_eq!(reg.state("user"), BreakerState::Closed);
    }

    #[test]
    fn breakers_are_independent_per_service() {
        let reg = CircuitBreakerRegistry::new(config(1, 3600));

        reg.on_failure("user");
        assert!(!reg.can_execute("user"));
        assert!(reg.can_execute("auth"));
        assert!(reg.can_execute("data"));
    }

    #[test]
    fn open_rejects_until_recovery_timeout() {
        // Long timeout: stays rejected.
        let reg = CircuitBreakerRegistry::new(config(1, 3600));
        reg.on_failure("user");
        assert!(!reg.can_execute("user"));
        assert_eq!(reg.state("user"), BreakerState::Open);

        // Zero timeout: the check itself performs the Open → HalfOpen
        // transition and permits the probe.
        let reg = CircuitBreakerRegistry::new(config(1, 0));
        reg.on_failure("user");
        std::thread::sleep(Duration::from_millis(10));
        assert!(reg.can_execute("user"));
        assert_eq!(reg.state("user"), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes_and_resets() {
        let reg = CircuitBreakerRegistry::new(config(1, 0));

        reg.on_failure("user");
        std::thread::sleep(Duration::from_millis(10));
        assert!(reg.can_execute("user")); // Open → HalfOpen
        reg.on_success("user");

        assert_eq!(reg.state("user"), BreakerState::Closed);
        assert_eq!(reg.failure_count("user"), 0);
        assert!(reg.can_execute("user"));
    }

    #[test]
    fn half_open_failure_reopens() {
        let reg = CircuitBreakerRegistry::new(config(1, 0));

        reg.on_failure("user");
        std::thread::sleep(Duration::from_millis(10));
        assert!(reg.can_execute("user")); // HalfOpen
        reg.on_failure("user"); // Probe fails → Open again.

        assert_eq!(reg.state("user"), BreakerState::Open);
    }

    #[test]
    fn full_recovery_cycle() {
        // Five failures open it, the recovery timeout passes, a probe
        // succeeds, and the breaker is fully reset.
        let reg = CircuitBreakerRegistry::new(config(5, 0));

        for _ in 0..4 {
            reg.on_failure("data");
            assert!(reg.can_execute("data"));
        }
        reg.on_failure("data");
        assert_eq!(reg.state("data"), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(10));
        assert!(reg.can_execute("data"));
        assert_eq!(reg.state("data"), BreakerState::HalfOpen);

        reg.on_success("data");
        assert_eq!(reg.state("data"), BreakerState::Closed);
        assert_eq!(reg.failure_count("data"), 0);
    }
}
