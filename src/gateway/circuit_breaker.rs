//! Circuit breaker for one endpoint class
//!
//! ```text
//! CLOSED ──failures in window >= threshold──> OPEN ──cooldown──> HALF_OPEN
//!   ^                                          ^                    │
//!   └──────────────── probe succeeds ──────────┴── probe fails ─────┘
//! ```
//!
//! Only outage-type failures (`Transient`) count. Half-open admits a single
//! trial call; everything else fails fast with `CircuitOpen` until it reports.
//! Every trip starts a new epoch, and outcomes of calls admitted in an older
//! epoch are ignored.

use super::{EndpointClass, GatewayError};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures inside `window_secs` that open the circuit
    pub failure_threshold: u32,
    pub window_secs: u64,
    /// How long the circuit stays open before probing
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_secs: 60,
            cooldown_secs: 30,
        }
    }
}

impl CircuitBreakerConfig {
    fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Ticket for one admitted call, handed back with its outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    epoch: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    epoch: u64,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    probe_started: Option<Instant>,
    total_opens: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    class: EndpointClass,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(class: EndpointClass, config: CircuitBreakerConfig) -> Self {
        Self {
            class,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                epoch: 0,
                failures: VecDeque::new(),
                opened_at: None,
                probe_started: None,
                total_opens: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn total_opens(&self) -> u64 {
        self.lock().total_opens
    }

    /// Admit a call or fail fast with `CircuitOpen`
    pub fn try_acquire(&self) -> Result<Admission, GatewayError> {
        let mut inner = self.lock();
        let now = Instant::now();
        let admission = Admission { epoch: inner.epoch };

        match inner.state {
            CircuitState::Closed => Ok(admission),
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map_or(true, |opened| now.duration_since(opened) >= self.config.cooldown());
                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_started = Some(now);
                    tracing::info!(class = %self.class, "Circuit half-open, sending trial call");
                    Ok(admission)
                } else {
                    Err(GatewayError::CircuitOpen { class: self.class })
                }
            }
            CircuitState::HalfOpen => {
                // A probe that never reported (dropped future) frees its slot after a cooldown
                let probe_stale = inner
                    .probe_started
                    .map_or(true, |started| now.duration_since(started) >= self.config.cooldown());
                if probe_stale {
                    inner.probe_started = Some(now);
                    Ok(admission)
                } else {
                    Err(GatewayError::CircuitOpen { class: self.class })
                }
            }
        }
    }

    /// Feed back the outcome of an admitted call
    pub fn record<T>(&self, admission: Admission, outcome: &Result<T, GatewayError>) {
        match outcome {
            Err(e) if e.indicates_outage() => self.record_failure(admission),
            Err(GatewayError::RateLimited { .. }) | Err(GatewayError::CircuitOpen { .. }) => {
                self.release_probe(admission)
            }
            _ => self.record_success(admission),
        }
    }

    pub fn record_success(&self, admission: Admission) {
        let mut inner = self.lock();
        if inner.epoch != admission.epoch {
            return;
        }
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.failures.clear();
            inner.opened_at = None;
            inner.probe_started = None;
            tracing::info!(class = %self.class, "Circuit closed, endpoint recovered");
        }
    }

    pub fn record_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        if inner.epoch != admission.epoch {
            return;
        }
        let now = Instant::now();

        match inner.state {
            CircuitState::HalfOpen => {
                self.trip(&mut inner, now);
            }
            CircuitState::Closed => {
                inner.failures.push_back(now);
                let window = self.config.window();
                while inner
                    .failures
                    .front()
                    .is_some_and(|t| now.duration_since(*t) > window)
                {
                    inner.failures.pop_front();
                }

                if inner.failures.len() >= self.config.failure_threshold as usize {
                    self.trip(&mut inner, now);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Give back a half-open probe slot without judging the endpoint
    pub fn release_probe(&self, admission: Admission) {
        let mut inner = self.lock();
        if inner.epoch == admission.epoch && inner.state == CircuitState::HalfOpen {
            inner.probe_started = None;
        }
    }

    fn trip(&self, inner: &mut BreakerInner, now: Instant) {
        inner.state = CircuitState::Open;
        inner.epoch += 1;
        inner.opened_at = Some(now);
        inner.probe_started = None;
        inner.failures.clear();
        inner.total_opens += 1;
        tracing::warn!(
            class = %self.class,
            cooldown_secs = self.config.cooldown_secs,
            "Circuit opened after repeated failures"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            EndpointClass::MarketData,
            CircuitBreakerConfig {
                failure_threshold: threshold,
                window_secs: 60,
                cooldown_secs: 30,
            },
        )
    }

    fn transient() -> Result<(), GatewayError> {
        Err(GatewayError::Transient("503".into()))
    }

    /// Admit a call and report `outcome` for it
    fn call(cb: &CircuitBreaker, outcome: Result<(), GatewayError>) {
        let admission = cb.try_acquire().unwrap();
        cb.record(admission, &outcome);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold() {
        let cb = breaker(3);

        call(&cb, transient());
        call(&cb, transient());
        assert_eq!(cb.state(), CircuitState::Closed);

        call(&cb, transient());
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(
            cb.try_acquire(),
            Err(GatewayError::CircuitOpen {
                class: EndpointClass::MarketData
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_expire() {
        let cb = breaker(2);

        call(&cb, transient());
        tokio::time::advance(Duration::from_secs(61)).await;
        call(&cb, transient());

        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_business_failures_do_not_count() {
        let cb = breaker(1);

        call(&cb, Err(GatewayError::Rejected("bad qty".into())));
        call(&cb, Err(GatewayError::Unauthorized("bad key".into())));
        call(
            &cb,
            Err(GatewayError::RateLimited {
                class: EndpointClass::MarketData,
            }),
        );

        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let cb = breaker(1);
        call(&cb, transient());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cb.try_acquire().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.try_acquire().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes() {
        let cb = breaker(1);
        call(&cb, transient());
        tokio::time::advance(Duration::from_secs(30)).await;

        call(&cb, Ok(()));

        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens() {
        let cb = breaker(1);
        call(&cb, transient());
        tokio::time::advance(Duration::from_secs(30)).await;

        call(&cb, transient());

        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.total_opens(), 2);
        assert!(cb.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_probe_can_be_retaken() {
        let cb = breaker(1);
        call(&cb, transient());
        tokio::time::advance(Duration::from_secs(30)).await;

        let probe = cb.try_acquire().unwrap();
        cb.release_probe(probe);

        assert!(cb.try_acquire().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_from_before_trip_is_ignored() {
        let cb = breaker(1);
        let slow_call = cb.try_acquire().unwrap();

        call(&cb, transient());
        tokio::time::advance(Duration::from_secs(30)).await;
        let probe = cb.try_acquire().unwrap();

        // the call admitted while closed finishes after the trip
        cb.record(slow_call, &Ok(()));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_err());

        cb.record(probe, &Ok(()));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_from_before_trip_is_ignored() {
        let cb = breaker(1);
        let slow_call = cb.try_acquire().unwrap();

        call(&cb, transient());
        tokio::time::advance(Duration::from_secs(30)).await;
        let _probe = cb.try_acquire().unwrap();

        cb.record(slow_call, &transient());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.total_opens(), 1);
    }
}
