//! Run summary: per-run counters and per-endpoint outcomes.

use bondlab_core::data::FetchError;
use bondlab_core::domain::SourceEndpoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Overall result of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Succeeded,
    PartiallySucceeded,
    Failed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::PartiallySucceeded => "partially-succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        })
    }
}

/// What happened to one physical endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointOutcome {
    Succeeded,
    /// Some pages arrived before a failure; their records were kept.
    Partial,
    Failed,
    /// The upstream answered 404; treated as an empty dataset.
    NotFound,
    /// Never attempted (cancelled or primary dataset failed first).
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointReport {
    pub source: SourceEndpoint,
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    pub outcome: EndpointOutcome,
    pub records: usize,
    pub pages: usize,
    pub duration_ms: u64,
    /// Error kind (`session_expired`, `circuit_open`, ...) when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EndpointReport {
    pub fn failed_with(&mut self, error: &FetchError) {
        self.error_kind = Some(error.kind().to_string());
        self.error = Some(error.to_string());
    }

    pub fn is_session_expired(&self) -> bool {
        self.error_kind.as_deref() == Some("session_expired")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Raw records fetched across all endpoints.
    pub fetched: usize,
    /// Records that transformed cleanly.
    pub transformed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records dropped by validation.
    pub skipped: usize,
    /// Endpoints that failed, plus a failed persist.
    pub errors: usize,
    /// Enrichment entries that matched no bond.
    pub orphaned: usize,
    /// Canonical bonds produced.
    pub bonds: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub endpoints: Vec<EndpointReport>,
    /// A capped sample of why records were skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

impl SyncSummary {
    /// Status from endpoint outcomes.
    ///
    /// Cancellation wins; then a failed or missing primary dataset, an
    /// expired session, or a failed persist is a failed run; any other
    /// endpoint trouble is partial success.
    pub fn derive_status(&self, cancelled: bool) -> RunStatus {
        if cancelled {
            return RunStatus::Cancelled;
        }
        let primary_ok = self
            .endpoints
            .iter()
            .filter(|e| e.source.is_primary())
            .any(|e| matches!(e.outcome, EndpointOutcome::Succeeded | EndpointOutcome::Partial));
        let session_expired = self.endpoints.iter().any(EndpointReport::is_session_expired);
        if !primary_ok || session_expired || self.persist_error.is_some() {
            return RunStatus::Failed;
        }
        let all_ok = self
            .endpoints
            .iter()
            .all(|e| matches!(e.outcome, EndpointOutcome::Succeeded | EndpointOutcome::NotFound));
        if all_ok {
            RunStatus::Succeeded
        } else {
            RunStatus::PartiallySucceeded
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Emit the summary through `tracing`, whether or not a run log is wired.
    pub fn log(&self) {
        let c = &self.counters;
        for e in self.endpoints.iter().filter(|e| e.error.is_some()) {
            warn!(
                run_id = %self.run_id,
                source = %e.source,
                path = %e.path,
                outcome = ?e.outcome,
                error = e.error.as_deref().unwrap_or_default(),
                "endpoint did not complete"
            );
        }
        if self.status == RunStatus::Succeeded {
            info!(
                run_id = %self.run_id,
                status = %self.status,
                fetched = c.fetched,
                bonds = c.bonds,
                created = c.created,
                updated = c.updated,
                unchanged = c.unchanged,
                skipped = c.skipped,
                duration_ms = self.duration_ms(),
                "sync finished"
            );
        } else {
            warn!(
                run_id = %self.run_id,
                status = %self.status,
                fetched = c.fetched,
                bonds = c.bonds,
                skipped = c.skipped,
                errors = c.errors,
                duration_ms = self.duration_ms(),
                "sync finished with problems"
            );
        }
    }
}
