//! Resilient request executor.
//!
//! One executor owns one upstream's breaker, rate limiter and retry budget.
//! A logical fetch is:
//!
//! 1. breaker check (fail fast while open, before any waiting),
//! 2. the call gate (one logical fetch at a time per executor),
//! 3. the attempt loop: rate-limit wait, physical call, classification,
//!    then one step of the [`AttemptState`] machine.
//!
//! The attempt loop's recovery path is a pure transition function
//! ([`advance`]) so session refresh and backoff can be tested without I/O.

use super::circuit_breaker::{BreakerConfig, BreakerError, BreakerStats, CircuitBreaker};
use super::endpoints::{EndpointCall, ResponseKind};
use super::provider::{FetchError, Payload};
use super::rate_limit::{uniform_jitter, RateLimiter};
use super::session::{SessionError, SessionStore};
use super::shape::{detect_shape, ResponseShape};
use super::tabular::{decode_delimited, decode_xlsx};
use super::transport::{HttpRequest, HttpResponse, Transport, TransportFailure};
use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing and retry parameters. All durations in milliseconds except the
/// request timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub request_delay_ms: u64,
    pub jitter_max_ms: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub backoff_jitter_ms: u64,
    pub timeout_secs: u64,
    /// Upper bound on pages per paginated fetch.
    pub max_pages: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 1_500,
            jitter_max_ms: 500,
            max_retries: 3,
            base_backoff_ms: 1_000,
            backoff_jitter_ms: 1_000,
            timeout_secs: 30,
            max_pages: 500,
        }
    }
}

impl ExecutorConfig {
    /// No delays at all. Used by tests and dry runs against local fixtures.
    pub fn immediate() -> Self {
        Self {
            request_delay_ms: 0,
            jitter_max_ms: 0,
            base_backoff_ms: 0,
            backoff_jitter_ms: 0,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `base_backoff * 2^attempt`, without jitter.
    pub fn backoff_base(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

/// Injected collaborators.
#[derive(Clone)]
pub struct ExecutorDeps {
    pub transport: Arc<dyn Transport>,
    pub session: Arc<dyn SessionStore>,
    pub clock: Arc<dyn Clock>,
}

/// State of one logical fetch's attempt loop.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    /// Issue physical attempt number `attempt` (0-based).
    Attempting { attempt: u32, refreshed: bool },
    /// The session looks expired; refresh before re-issuing `attempt`.
    ExpiredPendingRefresh { attempt: u32 },
    /// Attempt `attempt` failed retryably; sleep, then issue `attempt + 1`.
    BackingOff {
        attempt: u32,
        refreshed: bool,
        error: FetchError,
    },
    Succeeded(Payload),
    Failed(FetchError),
}

impl AttemptState {
    pub fn initial(needs_session_first: bool) -> Self {
        if needs_session_first {
            AttemptState::ExpiredPendingRefresh { attempt: 0 }
        } else {
            AttemptState::Attempting {
                attempt: 0,
                refreshed: false,
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Succeeded(_) | AttemptState::Failed(_))
    }

    fn name(&self) -> &'static str {
        match self {
            AttemptState::Attempting { .. } => "attempting",
            AttemptState::ExpiredPendingRefresh { .. } => "expired-pending-refresh",
            AttemptState::BackingOff { .. } => "backing-off",
            AttemptState::Succeeded(_) => "succeeded",
            AttemptState::Failed(_) => "failed",
        }
    }
}

/// What the driver observed while in the current state.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// A response of the expected kind, already decoded.
    Completed(Payload),
    /// HTTP 404.
    NotFound,
    /// 401/403, or a success status carrying an error-page body.
    SessionRejected(String),
    /// Transport failure or non-2xx status other than 401/403/404.
    Retryable(FetchError),
    /// Non-retryable failure (malformed payload).
    Fatal(FetchError),
    RefreshSucceeded,
    RefreshFailed(SessionError),
    BackoffElapsed,
}

impl Observation {
    fn name(&self) -> &'static str {
        match self {
            Observation::Completed(_) => "completed",
            Observation::NotFound => "not-found",
            Observation::SessionRejected(_) => "session-rejected",
            Observation::Retryable(_) => "retryable",
            Observation::Fatal(_) => "fatal",
            Observation::RefreshSucceeded => "refresh-succeeded",
            Observation::RefreshFailed(_) => "refresh-failed",
            Observation::BackoffElapsed => "backoff-elapsed",
        }
    }
}

/// Pure transition function of the attempt loop.
///
/// At most one refresh per logical fetch; a refresh retries the same attempt
/// index. Retryable failures back off while `attempt < max_retries`, so a
/// fetch makes at most `max_retries + 1` physical attempts plus one
/// post-refresh re-issue.
pub fn advance(state: AttemptState, observation: Observation, max_retries: u32) -> AttemptState {
    use AttemptState as S;
    use Observation as O;

    match (state, observation) {
        (S::Attempting { .. }, O::Completed(payload)) => S::Succeeded(payload),
        (S::Attempting { .. }, O::NotFound) => S::Succeeded(Payload::NotFound),
        (S::Attempting { attempt, refreshed }, O::SessionRejected(reason)) => {
            if refreshed {
                S::Failed(FetchError::SessionExpired(format!(
                    "{reason} after refreshing the session"
                )))
            } else {
                S::ExpiredPendingRefresh { attempt }
            }
        }
        (S::Attempting { attempt, refreshed }, O::Retryable(error)) => {
            if attempt < max_retries {
                S::BackingOff {
                    attempt,
                    refreshed,
                    error,
                }
            } else {
                S::Failed(error)
            }
        }
        (S::Attempting { .. }, O::Fatal(error)) => S::Failed(error),

        (S::ExpiredPendingRefresh { attempt }, O::RefreshSucceeded) => S::Attempting {
            attempt,
            refreshed: true,
        },
        (S::ExpiredPendingRefresh { .. }, O::RefreshFailed(e)) => {
            S::Failed(FetchError::SessionExpired(e.to_string()))
        }

        (
            S::BackingOff {
                attempt, refreshed, ..
            },
            O::BackoffElapsed,
        ) => S::Attempting {
            attempt: attempt + 1,
            refreshed,
        },

        (terminal @ (S::Succeeded(_) | S::Failed(_)), _) => terminal,
        (state, observation) => S::Failed(FetchError::Client(format!(
            "observation '{}' is invalid while {}",
            observation.name(),
            state.name()
        ))),
    }
}

/// Read-only executor counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub upstream: String,
    pub logical_fetches: u64,
    pub physical_attempts: u64,
    pub retries: u64,
    pub refreshes: u64,
    pub not_found: u64,
    pub breaker: BreakerStats,
}

#[derive(Default)]
struct Counters {
    logical_fetches: AtomicU64,
    physical_attempts: AtomicU64,
    retries: AtomicU64,
    refreshes: AtomicU64,
    not_found: AtomicU64,
}

pub struct ResilientExecutor {
    upstream: String,
    base_url: String,
    config: ExecutorConfig,
    deps: ExecutorDeps,
    breaker: CircuitBreaker,
    /// Call gate and rate-limiter state in one lock.
    gate: Mutex<RateLimiter>,
    counters: Counters,
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("upstream", &self.upstream)
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResilientExecutor {
    pub fn new(
        upstream: impl Into<String>,
        base_url: impl Into<String>,
        config: ExecutorConfig,
        breaker: BreakerConfig,
        deps: ExecutorDeps,
    ) -> Self {
        let upstream = upstream.into();
        let limiter = RateLimiter::new(
            Duration::from_millis(config.request_delay_ms),
            Duration::from_millis(config.jitter_max_ms),
        );
        Self {
            breaker: CircuitBreaker::new(upstream.clone(), breaker, deps.clock.clone()),
            upstream,
            base_url: base_url.into(),
            config,
            deps,
            gate: Mutex::new(limiter),
            counters: Counters::default(),
        }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Perform one logical fetch.
    pub fn fetch(&self, call: &EndpointCall) -> Result<Payload, FetchError> {
        self.counters.logical_fetches.fetch_add(1, Ordering::Relaxed);
        let result = self.breaker.execute(|| {
            let mut limiter = self.gate.lock().unwrap_or_else(|e| e.into_inner());
            self.attempt_loop(call, &mut limiter)
        });

        match result {
            Ok(payload) => {
                if payload.is_not_found() {
                    self.counters.not_found.fetch_add(1, Ordering::Relaxed);
                }
                Ok(payload)
            }
            Err(BreakerError::Open { retry_in }) => {
                debug!(upstream = %self.upstream, ?retry_in, "rejected by open breaker");
                Err(FetchError::CircuitOpen {
                    upstream: self.upstream.clone(),
                    retry_in,
                })
            }
            Err(BreakerError::Inner(e)) => Err(e),
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            upstream: self.upstream.clone(),
            logical_fetches: self.counters.logical_fetches.load(Ordering::Relaxed),
            physical_attempts: self.counters.physical_attempts.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            not_found: self.counters.not_found.load(Ordering::Relaxed),
            breaker: self.breaker.stats(),
        }
    }

    fn attempt_loop(
        &self,
        call: &EndpointCall,
        limiter: &mut RateLimiter,
    ) -> Result<Payload, FetchError> {
        let needs_session_first = call.requires_session && self.deps.session.get().is_none();
        let mut state = AttemptState::initial(needs_session_first);

        loop {
            let observation = match &state {
                AttemptState::Succeeded(_) | AttemptState::Failed(_) => break,
                AttemptState::Attempting { attempt, .. } => {
                    let waited = limiter.wait(self.deps.clock.as_ref());
                    self.counters.physical_attempts.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        upstream = %self.upstream,
                        path = %call.path,
                        attempt,
                        waited_ms = waited.as_millis() as u64,
                        "physical attempt"
                    );
                    let response = self.deps.transport.send(&self.request(call));
                    classify(call.kind, response)
                }
                AttemptState::ExpiredPendingRefresh { attempt } => {
                    self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
                    info!(upstream = %self.upstream, attempt, "refreshing session cookies");
                    match self.deps.session.refresh() {
                        Ok(_) => Observation::RefreshSucceeded,
                        Err(e) => {
                            warn!(upstream = %self.upstream, error = %e, "session refresh failed");
                            Observation::RefreshFailed(e)
                        }
                    }
                }
                AttemptState::BackingOff { attempt, error, .. } => {
                    let delay = self.config.backoff_base(*attempt)
                        + uniform_jitter(Duration::from_millis(self.config.backoff_jitter_ms));
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        upstream = %self.upstream,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after backoff"
                    );
                    self.deps.clock.sleep(delay);
                    Observation::BackoffElapsed
                }
            };
            state = advance(state, observation, self.config.max_retries);
        }

        match state {
            AttemptState::Succeeded(payload) => Ok(payload),
            AttemptState::Failed(error) => Err(error),
            // The loop only exits on a terminal state.
            other => Err(FetchError::Client(format!(
                "attempt loop ended while {}",
                other.name()
            ))),
        }
    }

    fn request(&self, call: &EndpointCall) -> HttpRequest {
        let mut headers = vec![(
            "Accept".to_string(),
            match call.kind {
                ResponseKind::Json => "application/json, text/plain, */*".to_string(),
                ResponseKind::TabularBinary => {
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet, text/csv, */*"
                        .to_string()
                }
            },
        )];
        if let Some(cookies) = self.deps.session.get() {
            headers.push(("Cookie".to_string(), cookies.header_value()));
        }

        HttpRequest {
            url: format!("{}{}", self.base_url.trim_end_matches('/'), call.path),
            query: call.query.clone(),
            headers,
            timeout: self.config.timeout(),
        }
    }
}

/// Map one physical exchange to an [`Observation`].
pub fn classify(
    kind: ResponseKind,
    response: Result<HttpResponse, TransportFailure>,
) -> Observation {
    let resp = match response {
        Ok(resp) => resp,
        Err(failure) => return Observation::Retryable(FetchError::transport(None, failure.to_string())),
    };

    match resp.status {
        404 => return Observation::NotFound,
        401 | 403 => return Observation::SessionRejected(format!("HTTP {}", resp.status)),
        _ if !resp.is_success() => {
            return Observation::Retryable(FetchError::transport(
                Some(resp.status),
                format!("upstream answered HTTP {}", resp.status),
            ))
        }
        _ => {}
    }

    let shape = detect_shape(&resp);
    match (kind, shape) {
        (_, ResponseShape::ErrorPage) => Observation::SessionRejected(format!(
            "error page with HTTP {}",
            resp.status
        )),
        (ResponseKind::Json, ResponseShape::Empty) => {
            Observation::Completed(Payload::Json(Value::Array(Vec::new())))
        }
        (ResponseKind::Json, ResponseShape::Json) => match serde_json::from_slice(&resp.body) {
            Ok(value) => Observation::Completed(Payload::Json(value)),
            Err(e) => Observation::Fatal(FetchError::Decode(format!("invalid JSON: {e}"))),
        },
        (ResponseKind::Json, other) => Observation::Fatal(FetchError::Decode(format!(
            "expected JSON, got {other:?} payload"
        ))),

        // The upstream wraps "please log in" in a JSON envelope with a success
        // status when a spreadsheet download is requested without a session.
        (ResponseKind::TabularBinary, ResponseShape::Json) => Observation::SessionRejected(
            "JSON envelope where a spreadsheet was expected".to_string(),
        ),
        (ResponseKind::TabularBinary, ResponseShape::Empty) => {
            Observation::Completed(Payload::Rows(Vec::new()))
        }
        (ResponseKind::TabularBinary, ResponseShape::Spreadsheet) => decoded(decode_xlsx(&resp.body)),
        (ResponseKind::TabularBinary, ResponseShape::Delimited) => {
            decoded(decode_delimited(&resp.body))
        }
        (ResponseKind::TabularBinary, ResponseShape::Unknown) => Observation::Fatal(
            FetchError::Decode("unrecognized binary payload".to_string()),
        ),
    }
}

fn decoded(result: Result<Vec<crate::domain::RawRecord>, String>) -> Observation {
    match result {
        Ok(rows) => Observation::Completed(Payload::Rows(rows)),
        Err(e) => Observation::Fatal(FetchError::Decode(e)),
    }
}
