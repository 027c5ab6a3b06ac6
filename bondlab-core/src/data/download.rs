//! Paginated fetch of one physical endpoint.

use super::endpoints::EndpointSpec;
use super::executor::ResilientExecutor;
use super::provider::{FetchError, FetchProgress, Payload};
use crate::domain::TaggedRecord;
use std::sync::atomic::{AtomicBool, Ordering};

/// Everything one endpoint produced, including a trailing failure.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedFetch {
    pub records: Vec<TaggedRecord>,
    /// Pages that returned successfully (404 pages included).
    pub pages: usize,
    /// The first page answered 404 and nothing was fetched.
    pub not_found: bool,
    /// Why fetching stopped early, if it did. Records fetched before the
    /// failure are kept.
    pub error: Option<FetchError>,
}

impl PagedFetch {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Fetch every page of `spec`, one page at a time.
///
/// Stops on a short or empty page, a 404, `max_pages`, the first error, or
/// when `cancel` is set. The flag is checked before each physical page.
pub fn fetch_all_pages(
    executor: &ResilientExecutor,
    spec: &EndpointSpec,
    cancel: &AtomicBool,
    progress: &dyn FetchProgress,
) -> PagedFetch {
    let label = spec.label();
    let mut out = PagedFetch {
        records: Vec::new(),
        pages: 0,
        not_found: false,
        error: None,
    };

    let max_pages = executor.config().max_pages.max(1);
    let mut page = spec.pagination.as_ref().map(|p| p.first_page);

    loop {
        if cancel.load(Ordering::Relaxed) {
            out.error = Some(FetchError::Cancelled);
            break;
        }

        let call = spec.call(page);
        let payload = match executor.fetch(&call) {
            Ok(payload) => payload,
            Err(e) => {
                out.error = Some(e);
                break;
            }
        };
        out.pages += 1;

        if payload.is_not_found() {
            out.not_found = out.records.is_empty();
            progress.on_page(&label, out.pages, 0);
            break;
        }

        let records = Payload::into_records(payload);
        let count = records.len();
        progress.on_page(&label, out.pages, count);
        out.records.extend(records.into_iter().map(|record| TaggedRecord {
            source: spec.source,
            context: spec.params.clone(),
            record,
        }));

        let (Some(pagination), Some(current)) = (&spec.pagination, page) else {
            break;
        };
        if count < pagination.page_size || out.pages >= max_pages {
            break;
        }
        page = Some(current + 1);
    }

    progress.on_endpoint_complete(&label, out.records.len(), out.error.as_ref());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::data::circuit_breaker::BreakerConfig;
    use crate::data::endpoints::{Pagination, ResponseKind};
    use crate::data::executor::{ExecutorConfig, ExecutorDeps};
    use crate::data::provider::NoProgress;
    use crate::data::transport::HttpResponse;
    use crate::domain::SourceEndpoint;
    use crate::testing::{FakeSessionStore, ScriptedTransport};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn paged_spec(page_size: usize) -> EndpointSpec {
        EndpointSpec {
            source: SourceEndpoint::Ratings,
            path: "/ratings".into(),
            kind: ResponseKind::Json,
            params: BTreeMap::new(),
            pagination: Some(Pagination::new(page_size)),
            requires_session: false,
        }
    }

    fn executor(transport: Arc<ScriptedTransport>) -> ResilientExecutor {
        ResilientExecutor::new(
            "test",
            "https://upstream.test",
            ExecutorConfig::immediate(),
            BreakerConfig::default(),
            ExecutorDeps {
                transport,
                session: Arc::new(FakeSessionStore::empty()),
                clock: Arc::new(ManualClock::new()),
            },
        )
    }

    #[test]
    fn stops_on_short_page() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(HttpResponse::json(200, r#"[{"isin":"A"},{"isin":"B"}]"#));
        transport.push_response(HttpResponse::json(200, r#"[{"isin":"C"}]"#));
        let exec = executor(transport.clone());

        let out = fetch_all_pages(&exec, &paged_spec(2), &AtomicBool::new(false), &NoProgress);
        assert!(out.is_complete());
        assert_eq!(out.pages, 2);
        assert_eq!(out.records.len(), 3);
        let pages: Vec<_> = transport
            .requests()
            .iter()
            .map(|r| r.query_param("page").map(str::to_string))
            .collect();
        assert_eq!(pages, vec![Some("0".into()), Some("1".into())]);
    }

    #[test]
    fn keeps_records_before_a_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(HttpResponse::json(200, r#"[{"isin":"A"}]"#));
        transport.push_response(HttpResponse::json(200, "{broken"));
        let exec = executor(transport);

        let out = fetch_all_pages(&exec, &paged_spec(1), &AtomicBool::new(false), &NoProgress);
        assert_eq!(out.records.len(), 1);
        assert!(matches!(out.error, Some(FetchError::Decode(_))));
    }

    #[test]
    fn cancellation_is_checked_before_the_first_page() {
        let transport = Arc::new(ScriptedTransport::new());
        let exec = executor(transport.clone());

        let out = fetch_all_pages(&exec, &paged_spec(1), &AtomicBool::new(true), &NoProgress);
        assert_eq!(out.error, Some(FetchError::Cancelled));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn not_found_first_page_is_flagged() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(HttpResponse::json(404, ""));
        let exec = executor(transport);

        let out = fetch_all_pages(&exec, &paged_spec(10), &AtomicBool::new(false), &NoProgress);
        assert!(out.is_complete());
        assert!(out.not_found);
        assert!(out.records.is_empty());
    }

    #[test]
    fn records_carry_call_context() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(HttpResponse::json(200, r#"[{"isin":"A"}]"#));
        let exec = executor(transport);
        let mut spec = paged_spec(10);
        spec.source = SourceEndpoint::IssuerTypes;
        spec.params.insert("issuerType".into(), "PSU".into());

        let out = fetch_all_pages(&exec, &spec, &AtomicBool::new(false), &NoProgress);
        assert_eq!(out.records[0].context.get("issuerType").map(String::as_str), Some("PSU"));
        assert_eq!(out.records[0].source, SourceEndpoint::IssuerTypes);
    }
}
