//! Fetch results, the error taxonomy, and progress reporting.

use crate::domain::RawRecord;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Structured errors surfaced by the executor.
///
/// "Not found" is deliberately absent: a 404 is a valid empty result and
/// comes back as [`Payload::NotFound`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("circuit open for '{upstream}' (retry in {}s)", retry_in.as_secs())]
    CircuitOpen { upstream: String, retry_in: Duration },

    #[error("transport error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport { status: Option<u16>, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("cancelled")]
    Cancelled,

    #[error("http client error: {0}")]
    Client(String),
}

impl FetchError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        FetchError::Transport {
            status,
            message: message.into(),
        }
    }

    /// Short machine-readable kind for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::SessionExpired(_) => "session_expired",
            FetchError::CircuitOpen { .. } => "circuit_open",
            FetchError::Transport { .. } => "transport",
            FetchError::Decode(_) => "decode",
            FetchError::Cancelled => "cancelled",
            FetchError::Client(_) => "client",
        }
    }
}

/// A successful logical fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The upstream answered 404: a valid, empty result.
    NotFound,
    Json(Value),
    Rows(Vec<RawRecord>),
}

/// Keys under which the upstream wraps record arrays.
const ENVELOPE_KEYS: [&str; 6] = ["data", "records", "result", "results", "content", "items"];

impl Payload {
    /// Flatten into records.
    ///
    /// JSON arrays yield one record per object element; objects are searched
    /// (one level deep, recursively through nested envelopes) for a
    /// well-known envelope key holding an array; any other object is a
    /// single record. Scalars yield nothing.
    pub fn into_records(self) -> Vec<RawRecord> {
        match self {
            Payload::NotFound => Vec::new(),
            Payload::Rows(rows) => rows,
            Payload::Json(value) => json_records(value),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Payload::NotFound)
    }
}

fn json_records(value: Value) -> Vec<RawRecord> {
    match value {
        Value::Array(items) => items.into_iter().filter_map(RawRecord::from_json).collect(),
        Value::Object(mut map) => {
            for key in ENVELOPE_KEYS {
                if let Some(inner) = map.remove(key) {
                    if inner.is_array() || inner.is_object() {
                        return json_records(inner);
                    }
                    map.insert(key.to_string(), inner);
                }
            }
            vec![RawRecord::from(map)]
        }
        _ => Vec::new(),
    }
}

/// Observer for paginated endpoint fetches.
pub trait FetchProgress: Send + Sync {
    fn on_page(&self, label: &str, page: usize, records: usize);

    fn on_endpoint_complete(&self, label: &str, records: usize, error: Option<&FetchError>);
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl FetchProgress for NoProgress {
    fn on_page(&self, _label: &str, _page: usize, _records: usize) {}

    fn on_endpoint_complete(&self, _label: &str, _records: usize, _error: Option<&FetchError>) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl FetchProgress for LogProgress {
    fn on_page(&self, label: &str, page: usize, records: usize) {
        debug!(endpoint = label, page, records, "page fetched");
    }

    fn on_endpoint_complete(&self, label: &str, records: usize, error: Option<&FetchError>) {
        match error {
            None => info!(endpoint = label, records, "endpoint complete"),
            Some(e) => warn!(endpoint = label, records, error = %e, "endpoint failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_payload_yields_object_records() {
        let p = Payload::Json(json!([{"isin": "A"}, 3, {"isin": "B"}]));
        assert_eq!(p.into_records().len(), 2);
    }

    #[test]
    fn envelope_is_unwrapped() {
        let p = Payload::Json(json!({"status": "ok", "data": {"content": [{"isin": "A"}]}}));
        let records = p.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("isin"), Some(&json!("A")));
    }

    #[test]
    fn plain_object_is_single_record() {
        let p = Payload::Json(json!({"isin": "A", "data": "scalar"}));
        let records = p.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("data"), Some(&json!("scalar")));
    }

    #[test]
    fn not_found_is_empty() {
        assert!(Payload::NotFound.into_records().is_empty());
    }

    #[test]
    fn error_messages_are_readable() {
        let e = FetchError::transport(Some(503), "service unavailable");
        assert_eq!(e.to_string(), "transport error (HTTP 503): service unavailable");
        assert_eq!(e.kind(), "transport");
    }
}
