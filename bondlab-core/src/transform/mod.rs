//! Raw records → canonical bonds.
//!
//! `extract` turns each tagged row into a keyed [`BondPatch`]; `merge`
//! folds enrichment maps into the primary rows and `finalize` derives the
//! canonical record.

pub mod classify;
pub mod dates;
pub mod extract;
pub mod fields;
pub mod merge;
pub mod slug;
pub mod values;

pub use classify::{ClassifyInput, IssuerClassifier, KeywordClassifier};
pub use dates::{parse_date, parse_date_str};
pub use extract::{extract, transform_all, SkippedRecord, TransformBatch};
pub use merge::{
    finalize, merge_records, BondPatch, EnrichmentKey, EnrichmentMap, MergeStats, PartialBond,
};
pub use slug::issuer_slug;
