//! Full sync runs against a scripted upstream.

use bondlab_core::clock::ManualClock;
use bondlab_core::data::endpoints::ISSUER_CATEGORY_PARAM;
use bondlab_core::data::{EndpointCatalog, ExecutorConfig, HttpResponse, SessionError};
use bondlab_core::domain::{Isin, SourceEndpoint};
use bondlab_core::rating::Grade;
use bondlab_core::testing::{test_cookies, FakeSessionStore, ScriptedTransport};
use bondlab_core::transform::KeywordClassifier;
use bondlab_runner::{
    EndpointOutcome, JsonlRunLog, MemoryStore, NullRunLog, RunStatus, SyncConfig, SyncDeps,
    Syncer,
};
use chrono::{TimeZone, Utc};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

const ACTIVE: &str = "/download/active-securities";
const COUPONS: &str = "/interest-rate-wise";
const RATINGS: &str = "/rating-wise";
const ISSUERS: &str = "/issuer-type-wise";
const RESTRUCTURED: &str = "/restructured";

// ── Helpers ──────────────────────────────────────────────────────────

/// Default catalog with the issuer-type listing narrowed to one category,
/// so routed responses map to calls deterministically.
fn config() -> SyncConfig {
    let mut endpoints = EndpointCatalog::default().entries;
    endpoints.retain(|e| {
        e.source != SourceEndpoint::IssuerTypes
            || e.params.get(ISSUER_CATEGORY_PARAM).map(String::as_str) == Some("PSU")
    });
    let mut config = SyncConfig {
        executor: ExecutorConfig::immediate(),
        endpoints,
        ..SyncConfig::default()
    };
    config.upstream.base_url = "https://upstream.test".into();
    config
}

struct Harness {
    transport: Arc<ScriptedTransport>,
    session: Arc<FakeSessionStore>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new(session: FakeSessionStore) -> Self {
        Self {
            transport: Arc::new(ScriptedTransport::new()),
            session: Arc::new(session),
            clock: Arc::new(ManualClock::starting_at(
                Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap(),
            )),
        }
    }

    fn seeded() -> Self {
        Self::new(FakeSessionStore::with_cookies(test_cookies("seed")))
    }

    fn syncer(&self, config: SyncConfig) -> Syncer {
        Syncer::new(
            config,
            SyncDeps {
                transport: self.transport.clone(),
                session: self.session.clone(),
                clock: self.clock.clone(),
                classifier: Arc::new(KeywordClassifier::default()),
            },
        )
        .unwrap()
    }

    fn route_primary(&self) {
        self.transport.route(
            ACTIVE,
            HttpResponse::new(
                200,
                Some("text/csv"),
                "ISIN,Issuer Name,Coupon Rate (%),Redemption Date,Credit Rating\n\
                 INE002A07809,Reliance Industries Ltd,8.95,09-11-2028,\n\
                 INE134E08KG4,Power Finance Corporation Ltd,7.40,15-03-2030,AA\n\
                 BADISIN,Broken Row Ltd,9.00,01-01-2030,\n",
            ),
        );
    }

    fn route_enrichment(&self) {
        self.transport.route(
            COUPONS,
            HttpResponse::json(
                200,
                r#"{"data":[{"ISIN":"INE134E08KG4","Coupon Type":"Fixed","Frequency":"Annual"}]}"#,
            ),
        );
        self.route_ratings();
        self.transport.route(
            ISSUERS,
            HttpResponse::json(200, r#"[{"Issuer Name":"Power Finance Corporation Ltd"}]"#),
        );
        self.transport.route(
            RESTRUCTURED,
            HttpResponse::json(200, r#"[{"ISIN":"INE002A07809"}]"#),
        );
    }

    fn route_ratings(&self) {
        self.transport.route(
            RATINGS,
            HttpResponse::json(
                200,
                r#"{"data":[{"isin":"INE002A07809","rating":"CRISIL AAA/Stable"},
                            {"isin":"INE134E08KG4","rating":"ICRA AA+ (CE)"}]}"#,
            ),
        );
    }

    fn route_all(&self) {
        self.route_primary();
        self.route_enrichment();
    }
}

fn isin(s: &str) -> Isin {
    Isin::parse(s).unwrap()
}

// ── Outcomes ─────────────────────────────────────────────────────────

#[test]
fn clean_run_persists_enriched_bonds() {
    let h = Harness::seeded();
    h.route_all();
    let store = MemoryStore::new();
    let cancel = AtomicBool::new(false);

    let summary = h.syncer(config()).run(&store, &NullRunLog, &cancel);

    assert_eq!(summary.status, RunStatus::Succeeded, "{summary:?}");
    assert_eq!(summary.endpoints.len(), 5);
    assert!(summary
        .endpoints
        .iter()
        .all(|e| e.outcome == EndpointOutcome::Succeeded));
    assert_eq!(summary.counters.fetched, 8);
    assert_eq!(summary.counters.skipped, 1);
    assert_eq!(summary.skipped_reasons.len(), 1);
    assert!(summary.skipped_reasons[0].starts_with("active-securities"));
    assert_eq!(summary.counters.bonds, 2);
    assert_eq!(summary.counters.created, 2);

    let reliance = store.get(&isin("INE002A07809")).unwrap();
    assert_eq!(reliance.normalized_rating, Grade::Aaa);
    assert!(reliance.is_restructured);

    let pfc = store.get(&isin("INE134E08KG4")).unwrap();
    assert_eq!(pfc.normalized_rating, Grade::AaPlus);
    assert_eq!(pfc.coupon_rate, Some(7.40));
}

#[test]
fn failed_enrichment_is_partial_success() {
    let h = Harness::seeded();
    h.route_primary();
    // Ratings left unrouted: every attempt is a connect failure.
    h.transport.route(COUPONS, HttpResponse::json(200, "[]"));
    h.transport.route(ISSUERS, HttpResponse::json(200, "[]"));
    h.transport.route(RESTRUCTURED, HttpResponse::json(200, "[]"));
    let store = MemoryStore::new();

    let summary = h.syncer(config()).run(&store, &NullRunLog, &AtomicBool::new(false));

    assert_eq!(summary.status, RunStatus::PartiallySucceeded);
    let ratings = summary
        .endpoints
        .iter()
        .find(|e| e.source == SourceEndpoint::Ratings)
        .unwrap();
    assert_eq!(ratings.outcome, EndpointOutcome::Failed);
    assert_eq!(ratings.error_kind.as_deref(), Some("transport"));
    assert_eq!(summary.counters.errors, 1);

    // Primary data is still persisted with the rating it carried.
    assert_eq!(store.len(), 2);
    let pfc = store.get(&isin("INE134E08KG4")).unwrap();
    assert_eq!(pfc.normalized_rating, Grade::Aa);
}

#[test]
fn missing_enrichment_dataset_counts_as_empty() {
    let h = Harness::seeded();
    h.route_primary();
    h.transport.route(COUPONS, HttpResponse::json(404, ""));
    h.route_ratings();
    h.transport.route(ISSUERS, HttpResponse::json(200, "[]"));
    h.transport.route(RESTRUCTURED, HttpResponse::json(200, "[]"));

    let summary = h
        .syncer(config())
        .run(&MemoryStore::new(), &NullRunLog, &AtomicBool::new(false));

    assert_eq!(summary.status, RunStatus::Succeeded);
    let coupons = summary
        .endpoints
        .iter()
        .find(|e| e.source == SourceEndpoint::CouponRates)
        .unwrap();
    assert_eq!(coupons.outcome, EndpointOutcome::NotFound);
}

#[test]
fn expired_session_fails_the_run() {
    let h = Harness::new(
        FakeSessionStore::with_cookies(test_cookies("seed"))
            .then_refresh_fails(SessionError::LoginFailed("captcha".into())),
    );
    h.route_primary();
    h.transport.route(COUPONS, HttpResponse::json(200, "[]"));
    h.route_ratings();
    h.transport.route(ISSUERS, HttpResponse::json(200, "[]"));
    h.transport.route(RESTRUCTURED, HttpResponse::json(401, "{}"));

    let summary = h
        .syncer(config())
        .run(&MemoryStore::new(), &NullRunLog, &AtomicBool::new(false));

    assert_eq!(summary.status, RunStatus::Failed);
    let restructured = summary
        .endpoints
        .iter()
        .find(|e| e.source == SourceEndpoint::Restructured)
        .unwrap();
    assert!(restructured.is_session_expired());
    assert_eq!(h.session.refresh_count(), 1);
}

#[test]
fn empty_session_is_refreshed_before_the_first_call() {
    let h = Harness::new(FakeSessionStore::empty());
    h.route_all();

    let summary = h
        .syncer(config())
        .run(&MemoryStore::new(), &NullRunLog, &AtomicBool::new(false));

    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(h.session.refresh_count(), 1);
    let cookie = h.transport.requests_to(ACTIVE)[0]
        .header("Cookie")
        .map(str::to_string)
        .unwrap_or_default();
    assert!(cookie.contains("session-refresh-1"));
}

#[test]
fn failed_primary_skips_enrichment_and_persists_nothing() {
    let h = Harness::seeded();
    h.route_enrichment();
    let store = MemoryStore::new();

    let summary = h.syncer(config()).run(&store, &NullRunLog, &AtomicBool::new(false));

    assert_eq!(summary.status, RunStatus::Failed);
    assert!(store.is_empty());
    let primary = &summary.endpoints[0];
    assert_eq!(primary.source, SourceEndpoint::ActiveSecurities);
    assert_eq!(primary.outcome, EndpointOutcome::Failed);
    assert!(summary.endpoints[1..]
        .iter()
        .all(|e| e.outcome == EndpointOutcome::Skipped));
    assert!(h.transport.requests_to(RATINGS).is_empty());
}

#[test]
fn cancelled_run_fetches_and_persists_nothing() {
    let h = Harness::seeded();
    h.route_all();
    let store = MemoryStore::new();

    let summary = h.syncer(config()).run(&store, &NullRunLog, &AtomicBool::new(true));

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert!(h.transport.requests().is_empty());
    assert!(store.is_empty());
}

// ── Idempotence and run log ──────────────────────────────────────────

#[test]
fn rerun_with_unchanged_data_reports_unchanged() {
    let h = Harness::seeded();
    h.route_all();
    h.route_all();
    let store = MemoryStore::new();
    let syncer = h.syncer(config());
    let cancel = AtomicBool::new(false);

    let first = syncer.run(&store, &NullRunLog, &cancel);
    h.clock.advance(Duration::from_secs(3_600));
    let second = syncer.run(&store, &NullRunLog, &cancel);

    assert_eq!(first.counters.created, 2);
    assert_eq!(second.counters.created, 0);
    assert_eq!(second.counters.updated, 0);
    assert_eq!(second.counters.unchanged, 2);
    assert_ne!(first.run_id, second.run_id);
}

#[test]
fn summaries_are_appended_to_the_run_log() {
    let dir = tempfile::tempdir().unwrap();
    let log = JsonlRunLog::new(dir.path().join("runs.jsonl"));
    let h = Harness::seeded();
    h.route_all();

    let summary = h
        .syncer(config())
        .run(&MemoryStore::new(), &log, &AtomicBool::new(false));

    let logged = log.last().unwrap().unwrap();
    assert_eq!(logged, summary);
}

#[test]
fn dataset_selection_limits_calls() {
    let h = Harness::seeded();
    h.route_primary();
    h.route_ratings();
    let mut config = config();
    config.sync.datasets = vec![SourceEndpoint::Ratings];

    let summary = h
        .syncer(config)
        .run(&MemoryStore::new(), &NullRunLog, &AtomicBool::new(false));

    let sources: Vec<SourceEndpoint> = summary.endpoints.iter().map(|e| e.source).collect();
    assert_eq!(
        sources,
        vec![SourceEndpoint::ActiveSecurities, SourceEndpoint::Ratings]
    );
    assert_eq!(summary.status, RunStatus::Succeeded);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let h = Harness::seeded();
    let mut config = config();
    config.sync.concurrency = 0;
    let result = Syncer::new(
        config,
        SyncDeps {
            transport: h.transport.clone(),
            session: h.session.clone(),
            clock: h.clock.clone(),
            classifier: Arc::new(KeywordClassifier::default()),
        },
    );
    assert!(result.is_err());
}

// ── Circuit breaker ──────────────────────────────────────────────────

#[test]
fn open_breaker_carries_into_the_next_run() {
    let h = Harness::seeded();
    let mut config = config();
    config.breaker.failure_threshold = 2;
    let syncer = h.syncer(config);
    let store = MemoryStore::new();
    let cancel = AtomicBool::new(false);

    // Ratings stay unrouted; everything else answers on every run.
    let run = || {
        h.route_primary();
        h.transport.route(COUPONS, HttpResponse::json(200, "[]"));
        h.transport.route(ISSUERS, HttpResponse::json(200, "[]"));
        h.transport.route(RESTRUCTURED, HttpResponse::json(200, "[]"));
        syncer.run(&store, &NullRunLog, &cancel)
    };
    let ratings_kind = |summary: &bondlab_runner::SyncSummary| {
        summary
            .endpoints
            .iter()
            .find(|e| e.source == SourceEndpoint::Ratings)
            .and_then(|e| e.error_kind.clone())
    };

    let first = run();
    assert_eq!(ratings_kind(&first).as_deref(), Some("transport"));
    let second = run();
    assert_eq!(ratings_kind(&second).as_deref(), Some("transport"));
    let attempts = h.transport.requests_to(RATINGS).len();
    assert_eq!(attempts, 8);

    let third = run();
    assert_eq!(ratings_kind(&third).as_deref(), Some("circuit_open"));
    assert_eq!(h.transport.requests_to(RATINGS).len(), attempts);
    assert_eq!(third.status, RunStatus::PartiallySucceeded);
    assert_eq!(store.len(), 2);

    // Other endpoints have their own breakers and kept working.
    assert_eq!(h.transport.requests_to(COUPONS).len(), 3);
}

#[test]
fn calls_sharing_a_path_share_one_breaker() {
    let h = Harness::seeded();
    let mut config = SyncConfig {
        executor: ExecutorConfig::immediate(),
        endpoints: EndpointCatalog::default().entries,
        ..SyncConfig::default()
    };
    config.upstream.base_url = "https://upstream.test".into();
    config.breaker.failure_threshold = 2;
    config.sync.concurrency = 1;
    // Issuer-type categories stay unrouted.
    h.route_primary();
    h.transport.route(COUPONS, HttpResponse::json(200, "[]"));
    h.route_ratings();
    h.transport.route(RESTRUCTURED, HttpResponse::json(200, "[]"));

    let summary = h
        .syncer(config)
        .run(&MemoryStore::new(), &NullRunLog, &AtomicBool::new(false));

    let kinds: Vec<&str> = summary
        .endpoints
        .iter()
        .filter(|e| e.source == SourceEndpoint::IssuerTypes)
        .filter_map(|e| e.error_kind.as_deref())
        .collect();
    assert_eq!(kinds.len(), 5);
    assert_eq!(kinds.iter().filter(|k| **k == "transport").count(), 2);
    assert_eq!(kinds.iter().filter(|k| **k == "circuit_open").count(), 3);
    // Two logical fetches of four attempts each, then nothing.
    assert_eq!(h.transport.requests_to(ISSUERS).len(), 8);
    assert_eq!(summary.status, RunStatus::PartiallySucceeded);
}

#[test]
fn breaker_admits_a_trial_after_the_cool_down() {
    let h = Harness::seeded();
    let mut config = config();
    config.breaker.failure_threshold = 1;
    let reset = Duration::from_millis(config.breaker.reset_timeout_ms);
    let syncer = h.syncer(config);
    let cancel = AtomicBool::new(false);

    h.route_primary();
    let first = syncer.run(&MemoryStore::new(), &NullRunLog, &cancel);
    assert_eq!(first.status, RunStatus::PartiallySucceeded);

    h.clock.advance(reset);
    h.route_all();
    let second = syncer.run(&MemoryStore::new(), &NullRunLog, &cancel);
    assert_eq!(second.status, RunStatus::Succeeded);
}
