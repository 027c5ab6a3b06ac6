//! Physical endpoint catalog.
//!
//! A logical dataset ([`SourceEndpoint`]) resolves to one or more physical
//! calls. Paths are relative to the configured base URL.

use crate::domain::SourceEndpoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a successful body should contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseKind {
    Json,
    TabularBinary,
}

/// Page-number pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page_param: String,
    pub size_param: String,
    pub page_size: usize,
    #[serde(default)]
    pub first_page: usize,
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_param: "page".into(),
            size_param: "size".into(),
            page_size,
            first_page: 0,
        }
    }
}

/// One physical endpoint call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub source: SourceEndpoint,
    pub path: String,
    pub kind: ResponseKind,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub requires_session: bool,
}

impl EndpointSpec {
    /// Short label for logs and reports: `source path?k=v`.
    pub fn label(&self) -> String {
        if self.params.is_empty() {
            format!("{} {}", self.source, self.path)
        } else {
            let params: Vec<String> = self.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("{} {}?{}", self.source, self.path, params.join("&"))
        }
    }

    /// The call for one page (or the single call when unpaginated).
    pub fn call(&self, page: Option<usize>) -> EndpointCall {
        let mut query: Vec<(String, String)> =
            self.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        if let (Some(p), Some(page)) = (&self.pagination, page) {
            query.push((p.page_param.clone(), page.to_string()));
            query.push((p.size_param.clone(), p.page_size.to_string()));
        }
        EndpointCall {
            path: self.path.clone(),
            query,
            kind: self.kind,
            requires_session: self.requires_session,
        }
    }
}

/// A fully-specified request the executor can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCall {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub kind: ResponseKind,
    pub requires_session: bool,
}

/// Issuer categories the issuer-type listing is requested for, one call each.
pub const ISSUER_CATEGORIES: [&str; 5] = [
    "PSU",
    "PRIVATE",
    "CENTRAL_GOVERNMENT",
    "STATE_GOVERNMENT",
    "FINANCIAL_INSTITUTION",
];

/// Category query parameter on the issuer-type listing.
pub const ISSUER_CATEGORY_PARAM: &str = "issuerType";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointCatalog {
    pub entries: Vec<EndpointSpec>,
}

impl EndpointCatalog {
    pub fn new(entries: Vec<EndpointSpec>) -> Self {
        Self { entries }
    }

    /// Physical calls for one dataset, in catalog order.
    pub fn resolve(&self, source: SourceEndpoint) -> Vec<&EndpointSpec> {
        self.entries.iter().filter(|e| e.source == source).collect()
    }
}

impl Default for EndpointCatalog {
    fn default() -> Self {
        let mut entries = vec![
            EndpointSpec {
                source: SourceEndpoint::ActiveSecurities,
                path: "/bds-service/v1/public/bdsinfo/download/active-securities".into(),
                kind: ResponseKind::TabularBinary,
                params: BTreeMap::new(),
                pagination: None,
                requires_session: true,
            },
            EndpointSpec {
                source: SourceEndpoint::CouponRates,
                path: "/bds-service/v1/public/bdsinfo/interest-rate-wise".into(),
                kind: ResponseKind::Json,
                params: BTreeMap::new(),
                pagination: Some(Pagination::new(500)),
                requires_session: false,
            },
            EndpointSpec {
                source: SourceEndpoint::Ratings,
                path: "/bds-service/v1/public/bdsinfo/rating-wise".into(),
                kind: ResponseKind::Json,
                params: BTreeMap::new(),
                pagination: Some(Pagination::new(500)),
                requires_session: false,
            },
        ];

        entries.extend(ISSUER_CATEGORIES.iter().map(|category| EndpointSpec {
            source: SourceEndpoint::IssuerTypes,
            path: "/bds-service/v1/public/bdsinfo/issuer-type-wise".into(),
            kind: ResponseKind::Json,
            params: BTreeMap::from([(ISSUER_CATEGORY_PARAM.to_string(), category.to_string())]),
            pagination: Some(Pagination::new(500)),
            requires_session: false,
        }));

        entries.push(EndpointSpec {
            source: SourceEndpoint::Restructured,
            path: "/bds-service/v1/public/bdsinfo/restructured".into(),
            kind: ResponseKind::Json,
            params: BTreeMap::new(),
            pagination: None,
            requires_session: true,
        });

        Self { entries }
    }
}
