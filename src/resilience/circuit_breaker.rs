//! Circuit breaker for upstream protection.
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: after open duration elapses
//! Half-Open → Closed: success_threshold successes
//! Half-Open → Open: any failure
//! ```

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSpec {
    pub name: String,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_ms: u64,
}

impl Default for CircuitBreakerSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            failure_threshold: 5,
            success_threshold: 1,
            open_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    spec: CircuitBreakerSpec,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(spec: CircuitBreakerSpec) -> Self {
        Self {
            spec,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn spec(&self) -> &CircuitBreakerSpec {
        &self.spec
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Check if the breaker lets a request through.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let open_for = Duration::from_millis(self.spec.open_ms);
                if inner.opened_at.is_some_and(|at| at.elapsed() >= open_for) {
                    inner.state = CircuitState::HalfOpen;
                    inner.successes = 0;
                    tracing::info!(policy = %self.spec.name, "Circuit half-open");
                    return true;
                }
                false
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => inner.failures = 0,
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.spec.success_threshold.max(1) {
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.opened_at = None;
                    tracing::info!(policy = %self.spec.name, "Circuit closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.spec.failure_threshold.max(1) {
                    Self::open(&mut inner, &self.spec.name);
                }
            }
            // Any failure in half-open immediately opens the circuit
            CircuitState::HalfOpen => Self::open(&mut inner, &self.spec.name),
            CircuitState::Open => {}
        }
    }

    fn open(inner: &mut Inner, name: &str) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.successes = 0;
        tracing::warn!(policy = %name, failures = inner.failures, "Circuit opened");
    }
}
