//! One sync run: fetch every planned endpoint, transform, merge, persist.
//!
//! Every endpoint path gets one [`ResilientExecutor`], built with the
//! [`Syncer`] and kept for its lifetime. Calls that share a path (the
//! issuer-type categories) share its breaker and rate-limit spacing, and
//! an open breaker stays open into the next run until its cool-down
//! passes. Fetches run on a private rayon pool capped at
//! `sync.concurrency`; pages within one endpoint stay sequential.
//!
//! The primary listing is fetched first. If it yields nothing usable the
//! enrichment endpoints are skipped and nothing is persisted.

use crate::config::{ConfigError, SyncConfig};
use crate::run_log::RunLog;
use crate::store::BondStore;
use crate::summary::{EndpointOutcome, EndpointReport, RunCounters, RunStatus, SyncSummary};
use bondlab_core::clock::Clock;
use bondlab_core::data::{
    fetch_all_pages, EndpointSpec, ExecutorDeps, FetchError, LogProgress, PagedFetch,
    ResilientExecutor, SessionStore, Transport,
};
use bondlab_core::domain::{CanonicalBond, TaggedRecord};
use bondlab_core::transform::{finalize, merge_records, transform_all, IssuerClassifier};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("build sync worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Collaborators injected into every executor a run creates.
#[derive(Clone)]
pub struct SyncDeps {
    pub transport: Arc<dyn Transport>,
    pub session: Arc<dyn SessionStore>,
    pub clock: Arc<dyn Clock>,
    pub classifier: Arc<dyn IssuerClassifier>,
}

/// Runs sync passes with one configuration and one set of collaborators.
pub struct Syncer {
    config: SyncConfig,
    deps: SyncDeps,
    pool: rayon::ThreadPool,
    /// One executor per endpoint path.
    executors: BTreeMap<String, Arc<ResilientExecutor>>,
}

/// Result of fetching one physical endpoint.
struct EndpointFetch {
    report: EndpointReport,
    records: Vec<TaggedRecord>,
}

impl Syncer {
    pub fn new(config: SyncConfig, deps: SyncDeps) -> Result<Self, SyncError> {
        config.validate()?;
        // Private pool, not the global one.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.sync.concurrency)
            .thread_name(|i| format!("bondlab-sync-{i}"))
            .build()?;

        let mut executors = BTreeMap::new();
        for spec in config.planned_endpoints() {
            executors
                .entry(spec.path.clone())
                .or_insert_with(|| Arc::new(build_executor(&config, &deps, &spec.path)));
        }
        debug!(executors = executors.len(), "sync executors ready");

        Ok(Self {
            config,
            deps,
            pool,
            executors,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one sync. Upstream and validation trouble never escape as errors;
    /// they are reflected in the returned summary's status and reports.
    pub fn run(&self, store: &dyn BondStore, run_log: &dyn RunLog, cancel: &AtomicBool) -> SyncSummary {
        let started_at = self.deps.clock.utc_now();
        let run_id = self.run_id(started_at);
        let planned = self.config.planned_endpoints();
        info!(run_id = %run_id, endpoints = planned.len(), "sync started");

        let (primary, enrichment): (Vec<EndpointSpec>, Vec<EndpointSpec>) =
            planned.into_iter().partition(|s| s.source.is_primary());

        let mut fetches = self.fetch_all(&primary, cancel);
        let primary_ok = fetches
            .iter()
            .any(|f| !f.records.is_empty() || f.report.outcome == EndpointOutcome::Succeeded);

        if primary_ok {
            fetches.extend(self.fetch_all(&enrichment, cancel));
        } else {
            warn!(run_id = %run_id, "primary listing unavailable; skipping enrichment");
            fetches.extend(enrichment.iter().map(|spec| EndpointFetch {
                report: blank_report(spec, EndpointOutcome::Skipped),
                records: Vec::new(),
            }));
        }
        let cancelled = cancel.load(Ordering::Relaxed);

        let mut counters = RunCounters::default();
        let mut records = Vec::new();
        let mut endpoints = Vec::with_capacity(fetches.len());
        for fetch in fetches {
            counters.fetched += fetch.records.len();
            if matches!(
                fetch.report.outcome,
                EndpointOutcome::Failed | EndpointOutcome::Partial
            ) {
                counters.errors += 1;
            }
            records.extend(fetch.records);
            endpoints.push(fetch.report);
        }

        let mut summary = SyncSummary {
            run_id,
            started_at,
            finished_at: started_at,
            status: RunStatus::Failed,
            counters,
            endpoints,
            skipped_reasons: Vec::new(),
            persist_error: None,
        };

        if primary_ok && !cancelled {
            let bonds = self.build_bonds(&records, &mut summary);
            self.persist(store, &bonds, &mut summary);
        }

        summary.finished_at = self.deps.clock.utc_now();
        summary.status = summary.derive_status(cancelled);
        summary.log();
        if let Err(e) = run_log.record(&summary) {
            warn!(run_id = %summary.run_id, error = %e, "run log write failed");
        }
        summary
    }

    /// `YYYYMMDDTHHMMSSZ-<hash>`, the hash covering config and start time.
    fn run_id(&self, started_at: DateTime<Utc>) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(started_at.to_rfc3339().as_bytes());
        if let Ok(json) = serde_json::to_vec(&self.config) {
            hasher.update(&json);
        }
        let hex = hasher.finalize().to_hex();
        format!("{}-{}", started_at.format("%Y%m%dT%H%M%SZ"), &hex[..12])
    }

    fn fetch_all(&self, specs: &[EndpointSpec], cancel: &AtomicBool) -> Vec<EndpointFetch> {
        if specs.is_empty() {
            return Vec::new();
        }
        self.pool
            .install(|| specs.par_iter().map(|spec| self.fetch_one(spec, cancel)).collect())
    }

    fn fetch_one(&self, spec: &EndpointSpec, cancel: &AtomicBool) -> EndpointFetch {
        if cancel.load(Ordering::Relaxed) {
            return EndpointFetch {
                report: blank_report(spec, EndpointOutcome::Skipped),
                records: Vec::new(),
            };
        }

        let executor = self.executor_for(&spec.path);
        let started = self.deps.clock.now();
        let fetched = fetch_all_pages(&executor, spec, cancel, &LogProgress);
        let elapsed = self.deps.clock.now().saturating_duration_since(started);

        let stats = executor.stats();
        debug!(
            endpoint = %spec.label(),
            attempts = stats.physical_attempts,
            retries = stats.retries,
            refreshes = stats.refreshes,
            breaker = %stats.breaker.state,
            "endpoint fetched"
        );

        let mut report = blank_report(spec, outcome_of(&fetched));
        report.records = fetched.records.len();
        report.pages = fetched.pages;
        report.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if let Some(e) = &fetched.error {
            report.failed_with(e);
        }
        EndpointFetch {
            report,
            records: fetched.records,
        }
    }

    fn executor_for(&self, path: &str) -> Arc<ResilientExecutor> {
        match self.executors.get(path) {
            Some(executor) => Arc::clone(executor),
            None => Arc::new(build_executor(&self.config, &self.deps, path)),
        }
    }

    fn build_bonds(&self, records: &[TaggedRecord], summary: &mut SyncSummary) -> Vec<CanonicalBond> {
        let batch = transform_all(records);
        summary.counters.transformed = batch.transformed;
        summary.counters.skipped = batch.skipped.len();
        summary.skipped_reasons = batch
            .skipped
            .iter()
            .take(self.config.sync.max_skipped_samples)
            .map(|s| format!("{}: {}", s.source, s.reason))
            .collect();

        let (partials, merge) = merge_records(batch.primary, batch.maps);
        summary.counters.orphaned = merge.orphaned;
        debug!(
            bonds = merge.bonds,
            duplicates = merge.duplicate_primary_rows,
            applied = merge.applied,
            orphaned = merge.orphaned,
            "enrichment merged"
        );

        let synced_at = self.deps.clock.utc_now();
        let classifier = self.deps.classifier.as_ref();
        let bonds: Vec<CanonicalBond> = partials
            .into_iter()
            .map(|p| finalize(p, classifier, synced_at))
            .collect();
        summary.counters.bonds = bonds.len();
        bonds
    }

    fn persist(&self, store: &dyn BondStore, bonds: &[CanonicalBond], summary: &mut SyncSummary) {
        match store.upsert_batch(bonds) {
            Ok(stats) => {
                summary.counters.created = stats.created;
                summary.counters.updated = stats.updated;
                summary.counters.unchanged = stats.unchanged;
            }
            Err(e) => {
                warn!(run_id = %summary.run_id, error = %e, "persist failed");
                summary.counters.errors += 1;
                summary.persist_error = Some(e.to_string());
            }
        }
    }
}

fn build_executor(config: &SyncConfig, deps: &SyncDeps, path: &str) -> ResilientExecutor {
    ResilientExecutor::new(
        format!("{}{}", config.upstream.name, path),
        config.upstream.base_url.clone(),
        config.executor.clone(),
        config.breaker.clone(),
        ExecutorDeps {
            transport: Arc::clone(&deps.transport),
            session: Arc::clone(&deps.session),
            clock: Arc::clone(&deps.clock),
        },
    )
}

fn blank_report(spec: &EndpointSpec, outcome: EndpointOutcome) -> EndpointReport {
    EndpointReport {
        source: spec.source,
        path: spec.path.clone(),
        params: spec.params.clone(),
        outcome,
        records: 0,
        pages: 0,
        duration_ms: 0,
        error_kind: None,
        error: None,
    }
}

fn outcome_of(fetched: &PagedFetch) -> EndpointOutcome {
    match &fetched.error {
        None if fetched.not_found => EndpointOutcome::NotFound,
        None => EndpointOutcome::Succeeded,
        Some(FetchError::Cancelled) if fetched.records.is_empty() => EndpointOutcome::Skipped,
        Some(_) if fetched.records.is_empty() => EndpointOutcome::Failed,
        Some(_) => EndpointOutcome::Partial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paged(records: usize, error: Option<FetchError>, not_found: bool) -> PagedFetch {
        let record = TaggedRecord::new(
            bondlab_core::domain::SourceEndpoint::Ratings,
            bondlab_core::domain::RawRecord::new(),
        );
        PagedFetch {
            records: vec![record; records],
            pages: records.min(1),
            not_found,
            error,
        }
    }

    #[test]
    fn endpoint_outcomes() {
        assert_eq!(outcome_of(&paged(3, None, false)), EndpointOutcome::Succeeded);
        assert_eq!(outcome_of(&paged(0, None, true)), EndpointOutcome::NotFound);
        assert_eq!(
            outcome_of(&paged(0, Some(FetchError::Cancelled), false)),
            EndpointOutcome::Skipped
        );
        assert_eq!(
            outcome_of(&paged(0, Some(FetchError::Decode("x".into())), false)),
            EndpointOutcome::Failed
        );
        assert_eq!(
            outcome_of(&paged(2, Some(FetchError::transport(Some(503), "down")), false)),
            EndpointOutcome::Partial
        );
    }
}
