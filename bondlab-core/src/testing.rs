//! Deterministic doubles for the executor's collaborators.
//!
//! Compiled only for tests and under the `testing` feature, which
//! downstream crates enable from their dev-dependencies to drive full sync
//! runs without a network.

use crate::data::session::{Cookie, CookieRefresher, SessionCookies, SessionError, SessionStore};
use crate::data::transport::{
    FailureKind, HttpRequest, HttpResponse, Transport, TransportFailure,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

type Scripted = Result<HttpResponse, TransportFailure>;

/// Transport that replays queued responses and records every request.
///
/// Responses can be queued globally (consumed in order by any request) or per
/// URL path suffix, which lets concurrent executors share one transport.
/// An exhausted script answers with a connect failure.
#[derive(Default)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Scripted>>,
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: HttpResponse) {
        lock(&self.queue).push_back(Ok(response));
    }

    pub fn push_failure(&self, kind: FailureKind, message: &str) {
        lock(&self.queue).push_back(Err(TransportFailure::new(kind, message)));
    }

    /// Queue a response for requests whose URL path ends with `path`.
    pub fn route(&self, path: &str, response: HttpResponse) {
        lock(&self.routes)
            .entry(path.to_string())
            .or_default()
            .push_back(Ok(response));
    }

    pub fn route_failure(&self, path: &str, kind: FailureKind, message: &str) {
        lock(&self.routes)
            .entry(path.to_string())
            .or_default()
            .push_back(Err(TransportFailure::new(kind, message)));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// Requests sent to URLs ending with `path`.
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.url.ends_with(path))
            .cloned()
            .collect()
    }

    fn next_for(&self, url: &str) -> Option<Scripted> {
        let mut routes = lock(&self.routes);
        let routed = routes
            .iter_mut()
            .filter(|(path, queue)| url.ends_with(path.as_str()) && !queue.is_empty())
            .max_by_key(|(path, _)| path.len())
            .and_then(|(_, queue)| queue.pop_front());
        drop(routes);
        routed.or_else(|| lock(&self.queue).pop_front())
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFailure> {
        lock(&self.requests).push(request.clone());
        self.next_for(&request.url).unwrap_or_else(|| {
            Err(TransportFailure::new(
                FailureKind::Connect,
                format!("no scripted response for {}", request.url),
            ))
        })
    }
}

/// Cookies with recognizable values for assertions.
pub fn test_cookies(tag: &str) -> SessionCookies {
    SessionCookies::new(
        Cookie::new("JSESSIONID", format!("session-{tag}")),
        Cookie::new("AUTH_TOKEN", format!("token-{tag}")),
    )
}

/// Session store whose refresh outcomes are scripted.
///
/// With an empty script every refresh succeeds with fresh test cookies.
#[derive(Default)]
pub struct FakeSessionStore {
    current: Mutex<Option<SessionCookies>>,
    outcomes: Mutex<VecDeque<Result<(), SessionError>>>,
    refreshes: AtomicU64,
}

impl FakeSessionStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_cookies(cookies: SessionCookies) -> Self {
        Self {
            current: Mutex::new(Some(cookies)),
            ..Self::default()
        }
    }

    pub fn then_refresh_fails(self, error: SessionError) -> Self {
        lock(&self.outcomes).push_back(Err(error));
        self
    }

    pub fn then_refresh_succeeds(self) -> Self {
        lock(&self.outcomes).push_back(Ok(()));
        self
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl SessionStore for FakeSessionStore {
    fn get(&self) -> Option<SessionCookies> {
        lock(&self.current).clone()
    }

    fn refresh(&self) -> Result<SessionCookies, SessionError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        match lock(&self.outcomes).pop_front() {
            Some(Err(e)) => Err(e),
            Some(Ok(())) | None => {
                let cookies = test_cookies(&format!("refresh-{n}"));
                *lock(&self.current) = Some(cookies.clone());
                Ok(cookies)
            }
        }
    }
}

/// Login collaborator replaying a fixed list of outcomes, then failing.
#[derive(Default)]
pub struct ScriptedRefresher {
    outcomes: Mutex<VecDeque<Result<SessionCookies, SessionError>>>,
    calls: AtomicU64,
}

impl ScriptedRefresher {
    pub fn new(outcomes: Vec<Result<SessionCookies, SessionError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CookieRefresher for ScriptedRefresher {
    fn login(&self) -> Result<SessionCookies, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.outcomes)
            .pop_front()
            .unwrap_or_else(|| Err(SessionError::LoginFailed("script exhausted".into())))
    }
}
