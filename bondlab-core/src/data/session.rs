//! Session-cookie state for the cookie-gated upstream endpoints.
//!
//! The upstream authorizes a subset of its endpoints with two opaque cookies
//! that expire on no published schedule. Fresh cookies come from an
//! out-of-band login ([`CookieRefresher`]); the executor only sees a
//! [`SessionStore`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

/// One cookie name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The two cookies the upstream expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookies {
    pub first: Cookie,
    pub second: Cookie,
}

impl SessionCookies {
    pub fn new(first: Cookie, second: Cookie) -> Self {
        Self { first, second }
    }

    /// Value for the `Cookie` request header.
    pub fn header_value(&self) -> String {
        format!(
            "{}={}; {}={}",
            self.first.name, self.first.value, self.second.name, self.second.value
        )
    }

    /// Both values present.
    pub fn is_complete(&self) -> bool {
        !self.first.value.trim().is_empty() && !self.second.value.trim().is_empty()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("login returned incomplete cookies")]
    IncompleteCookies,

    #[error("session refresh disabled: {0}")]
    Disabled(String),
}

/// Explicit session state handed to each executor.
pub trait SessionStore: Send + Sync {
    /// Current cookies, if any.
    fn get(&self) -> Option<SessionCookies>;

    /// Obtain fresh cookies. Treated as atomic; callers do not retry it.
    fn refresh(&self) -> Result<SessionCookies, SessionError>;
}

/// The out-of-band login collaborator.
pub trait CookieRefresher: Send + Sync {
    fn login(&self) -> Result<SessionCookies, SessionError>;
}

/// Refresher for deployments without an automated login.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRefresher;

impl CookieRefresher for NoRefresher {
    fn login(&self) -> Result<SessionCookies, SessionError> {
        Err(SessionError::Disabled("no login collaborator configured".into()))
    }
}

/// Session store backed by a [`CookieRefresher`].
///
/// Refreshes are serialized. A failed login poisons the store until
/// [`reset`](Self::reset) so concurrent executors do not each hammer the login
/// flow within one run.
pub struct RefreshingSessionStore {
    cookies: RwLock<Option<SessionCookies>>,
    refresher: Box<dyn CookieRefresher>,
    refresh_gate: Mutex<()>,
    failed: AtomicBool,
    refreshes: AtomicU64,
    /// Bumped on every successful login.
    generation: AtomicU64,
}

impl RefreshingSessionStore {
    pub fn new(initial: Option<SessionCookies>, refresher: Box<dyn CookieRefresher>) -> Self {
        Self {
            cookies: RwLock::new(initial),
            refresher,
            refresh_gate: Mutex::new(()),
            failed: AtomicBool::new(false),
            refreshes: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Number of login attempts made so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Whether a login failed since the last reset.
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    /// Re-arm after a failed login (start of a new run).
    pub fn reset(&self) {
        self.failed.store(false, Ordering::Relaxed);
    }
}

impl SessionStore for RefreshingSessionStore {
    fn get(&self) -> Option<SessionCookies> {
        self.cookies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn refresh(&self) -> Result<SessionCookies, SessionError> {
        let seen = self.generation.load(Ordering::Acquire);
        let _gate = self.refresh_gate.lock().unwrap_or_else(|e| e.into_inner());
        if self.failed.load(Ordering::Relaxed) {
            return Err(SessionError::LoginFailed(
                "an earlier login in this run failed".into(),
            ));
        }
        // Another caller logged in while we waited on the gate.
        if self.generation.load(Ordering::Acquire) != seen {
            if let Some(cookies) = self.get() {
                debug!("session already refreshed by a concurrent caller");
                return Ok(cookies);
            }
        }

        self.refreshes.fetch_add(1, Ordering::Relaxed);
        let result = self.refresher.login().and_then(|cookies| {
            if cookies.is_complete() {
                Ok(cookies)
            } else {
                Err(SessionError::IncompleteCookies)
            }
        });

        match result {
            Ok(cookies) => {
                *self.cookies.write().unwrap_or_else(|e| e.into_inner()) = Some(cookies.clone());
                self.generation.fetch_add(1, Ordering::Release);
                info!("session cookies refreshed");
                Ok(cookies)
            }
            Err(e) => {
                self.failed.store(true, Ordering::Relaxed);
                warn!(error = %e, "session refresh failed");
                Err(e)
            }
        }
    }
}
