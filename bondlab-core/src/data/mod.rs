//! Upstream access: resilient execution, session handling, payload decoding.

pub mod circuit_breaker;
pub mod download;
pub mod endpoints;
pub mod executor;
pub mod provider;
pub mod rate_limit;
pub mod session;
pub mod shape;
pub mod tabular;
pub mod transport;

pub use circuit_breaker::{
    BreakerConfig, BreakerError, BreakerState, BreakerStats, CircuitBreaker, StateTransition,
};
pub use download::{fetch_all_pages, PagedFetch};
pub use endpoints::{EndpointCall, EndpointCatalog, EndpointSpec, Pagination, ResponseKind};
pub use executor::{ExecutorConfig, ExecutorDeps, ExecutorStats, ResilientExecutor};
pub use provider::{FetchError, FetchProgress, LogProgress, NoProgress, Payload};
pub use rate_limit::RateLimiter;
pub use session::{
    Cookie, CookieRefresher, NoRefresher, RefreshingSessionStore, SessionCookies, SessionError,
    SessionStore,
};
pub use shape::{detect_shape, ResponseShape};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportFailure};
