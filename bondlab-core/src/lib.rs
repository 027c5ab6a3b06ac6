//! BondLab Core — resilient ingestion of bond reference data.
//!
//! This crate contains the ingestion pipeline:
//! - Circuit breaker and resilient request executor (rate limiting, retry
//!   with backoff, session-cookie recovery, response-shape detection)
//! - Payload decoding (JSON envelopes, spreadsheets, delimited text)
//! - Per-endpoint transformers and the non-destructive enrichment merge
//! - Rating grade normalization and ranking
//!
//! Orchestration, persistence and run logging live in `bondlab-runner`.

pub mod clock;
pub mod data;
pub mod domain;
pub mod rating;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transform;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the runner shares across worker
    /// threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::CanonicalBond>();
        require_sync::<domain::CanonicalBond>();
        require_send::<domain::TaggedRecord>();
        require_sync::<domain::TaggedRecord>();
        require_send::<rating::Grade>();
        require_sync::<rating::Grade>();

        require_send::<data::ResilientExecutor>();
        require_sync::<data::ResilientExecutor>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();
        require_send::<data::RefreshingSessionStore>();
        require_sync::<data::RefreshingSessionStore>();
        require_send::<data::FetchError>();
        require_sync::<data::FetchError>();
        require_send::<data::PagedFetch>();
        require_sync::<data::PagedFetch>();

        require_send::<transform::KeywordClassifier>();
        require_sync::<transform::KeywordClassifier>();
        require_send::<transform::EnrichmentMap>();
        require_sync::<transform::EnrichmentMap>();

        require_send::<testing::ScriptedTransport>();
        require_sync::<testing::ScriptedTransport>();
        require_send::<clock::ManualClock>();
        require_sync::<clock::ManualClock>();
    }
}
