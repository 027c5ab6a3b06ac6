//! Circuit breaker for a degraded or hostile upstream.
//!
//! Once failures reach the threshold the breaker opens and refuses every call
//! for a cool-down period. After the cool-down exactly one trial call is let
//! through (half-open); its outcome either closes the breaker or re-opens it
//! with a fresh cool-down.
//!
//! Failure counting is consecutive (any success resets it to zero) and, when
//! `monitoring_window` is set, also time-bounded: failures older than the
//! window are forgotten before the threshold check. With no window configured
//! the breaker is a plain consecutive-failure counter.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    /// Normal operation: calls pass through.
    Closed,
    /// Tripped: calls are rejected until the cool-down expires.
    Open,
    /// Cool-down expired: a single trial call decides the next state.
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Breaker tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures (within the window) that open the breaker.
    pub failure_threshold: u32,
    /// Cool-down before a half-open trial, in milliseconds.
    pub reset_timeout_ms: u64,
    /// Failures older than this are forgotten. `None` = purely consecutive.
    pub monitoring_window_ms: Option<u64>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            monitoring_window_ms: Some(120_000),
        }
    }
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn monitoring_window(&self) -> Option<Duration> {
        self.monitoring_window_ms.map(Duration::from_millis)
    }
}

/// Notification emitted on every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: BreakerState,
    pub to: BreakerState,
    pub failure_count: u32,
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum BreakerError<E> {
    /// Rejected without running the operation.
    Open { retry_in: Duration },
    /// The operation ran and failed.
    Inner(E),
}

/// Read-only counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub failure_count: u32,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Remaining cool-down when open.
    #[serde(skip)]
    pub retry_in: Option<Duration>,
}

type TransitionListener = Box<dyn Fn(&StateTransition) + Send + Sync>;

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: VecDeque<Instant>,
    next_retry_at: Option<Instant>,
    trial_in_flight: bool,
    total_requests: u64,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
    last_failure_at: Option<DateTime<Utc>>,
}

/// Tri-state circuit breaker scoped to one upstream.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
    listener: Option<TransitionListener>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("inner", &self.inner)
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                next_retry_at: None,
                trial_in_flight: false,
                total_requests: 0,
                total_successes: 0,
                total_failures: 0,
                total_rejections: 0,
                last_failure_at: None,
            }),
            listener: None,
        }
    }

    /// Register a callback invoked on every state transition.
    pub fn with_listener(
        mut self,
        listener: impl Fn(&StateTransition) + Send + Sync + 'static,
    ) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Run `op` through the breaker.
    ///
    /// While open (and before the cool-down elapses) `op` is not invoked and
    /// `BreakerError::Open` is returned. Every `Err` from `op` counts as a failure.
    pub fn execute<T, E>(&self, op: impl FnOnce() -> Result<T, E>) -> Result<T, BreakerError<E>> {
        self.admit()?;
        let mut trial = TrialSlot {
            breaker: self,
            armed: true,
        };
        let result = op();
        trial.armed = false;
        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> BreakerStats {
        let now = self.clock.now();
        let mut inner = self.lock();
        self.prune(&mut inner, now);
        BreakerStats {
            state: inner.state,
            failure_count: inner.failures.len() as u32,
            total_requests: inner.total_requests,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
            last_failure_at: inner.last_failure_at,
            retry_in: match inner.state {
                BreakerState::Open => inner.next_retry_at.map(|t| t.saturating_duration_since(now)),
                _ => None,
            },
        }
    }

    fn admit<E>(&self) -> Result<(), BreakerError<E>> {
        let now = self.clock.now();
        let mut transitions = Vec::new();
        let admitted = {
            let mut inner = self.lock();
            inner.total_requests += 1;
            match inner.state {
                BreakerState::Closed => Ok(()),
                BreakerState::Open => {
                    let retry_at = inner.next_retry_at.unwrap_or(now);
                    if now >= retry_at {
                        inner.state = BreakerState::HalfOpen;
                        inner.trial_in_flight = true;
                        transitions.push(StateTransition {
                            from: BreakerState::Open,
                            to: BreakerState::HalfOpen,
                            failure_count: inner.failures.len() as u32,
                        });
                        Ok(())
                    } else {
                        inner.total_rejections += 1;
                        Err(BreakerError::Open {
                            retry_in: retry_at.saturating_duration_since(now),
                        })
                    }
                }
                BreakerState::HalfOpen => {
                    if inner.trial_in_flight {
                        inner.total_rejections += 1;
                        Err(BreakerError::Open {
                            retry_in: Duration::ZERO,
                        })
                    } else {
                        inner.trial_in_flight = true;
                        Ok(())
                    }
                }
            }
        };
        self.notify(&transitions);
        admitted
    }

    fn record_success(&self) {
        let mut transitions = Vec::new();
        {
            let mut inner = self.lock();
            inner.total_successes += 1;
            inner.failures.clear();
            inner.trial_in_flight = false;
            if inner.state != BreakerState::Closed {
                transitions.push(StateTransition {
                    from: inner.state,
                    to: BreakerState::Closed,
                    failure_count: 0,
                });
                inner.state = BreakerState::Closed;
                inner.next_retry_at = None;
            }
        }
        self.notify(&transitions);
    }

    fn record_failure(&self) {
        let now = self.clock.now();
        let mut transitions = Vec::new();
        {
            let mut inner = self.lock();
            inner.total_failures += 1;
            inner.last_failure_at = Some(self.clock.utc_now());
            inner.failures.push_back(now);
            self.prune(&mut inner, now);
            let count = inner.failures.len() as u32;

            let should_open = match inner.state {
                BreakerState::HalfOpen => true,
                BreakerState::Closed => count >= self.config.failure_threshold,
                BreakerState::Open => false,
            };
            inner.trial_in_flight = false;
            if should_open {
                transitions.push(StateTransition {
                    from: inner.state,
                    to: BreakerState::Open,
                    failure_count: count,
                });
                inner.state = BreakerState::Open;
                inner.next_retry_at = Some(now + self.config.reset_timeout());
            }
        }
        self.notify(&transitions);
    }

    fn prune(&self, inner: &mut Inner, now: Instant) {
        if let Some(window) = self.config.monitoring_window() {
            while let Some(&oldest) = inner.failures.front() {
                if now.saturating_duration_since(oldest) > window {
                    inner.failures.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    fn notify(&self, transitions: &[StateTransition]) {
        for t in transitions {
            match t.to {
                BreakerState::Open => warn!(
                    upstream = %self.name,
                    from = %t.from,
                    failures = t.failure_count,
                    reset_timeout_ms = self.config.reset_timeout_ms,
                    "circuit breaker opened"
                ),
                _ => info!(
                    upstream = %self.name,
                    from = %t.from,
                    to = %t.to,
                    "circuit breaker transition"
                ),
            }
            if let Some(listener) = &self.listener {
                listener(t);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Frees the half-open trial slot if `op` unwinds before reporting back.
struct TrialSlot<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}
