//! Per-endpoint transformers: raw rows into keyed patches.

use super::dates::parse_date;
use super::fields::{self, first_non_empty, first_text};
use super::merge::{BondPatch, EnrichmentKey, EnrichmentMap};
use super::slug::issuer_slug;
use super::values::{parse_amount, parse_coupon_type, parse_flag, parse_frequency, parse_percent};
use crate::data::endpoints::ISSUER_CATEGORY_PARAM;
use crate::domain::{Isin, RawRecord, SourceEndpoint, TaggedRecord, ValidationError};
use serde::Serialize;
use tracing::debug;

/// Transform one tagged record.
///
/// The primary listing requires an ISIN. Enrichment rows fall back to the
/// issuer slug when they carry no ISIN; a present but malformed ISIN is an
/// error either way.
pub fn extract(tagged: &TaggedRecord) -> Result<(EnrichmentKey, BondPatch), ValidationError> {
    let record = &tagged.record;
    let key = key_for(tagged.source, record)?;
    let patch = match tagged.source {
        SourceEndpoint::ActiveSecurities => active_security(record),
        SourceEndpoint::CouponRates => coupon_terms(record),
        SourceEndpoint::Ratings => rating(record),
        SourceEndpoint::IssuerTypes => issuer_type(tagged),
        SourceEndpoint::Restructured => restructured(record),
    };
    Ok((key, patch))
}

fn key_for(source: SourceEndpoint, record: &RawRecord) -> Result<EnrichmentKey, ValidationError> {
    if let Some(raw) = first_text(record, fields::ISIN) {
        return Isin::parse(&raw).map(EnrichmentKey::Isin);
    }
    if source.is_primary() {
        return Err(ValidationError::MissingIsin);
    }
    first_text(record, fields::ISSUER_NAME)
        .map(|name| issuer_slug(&name))
        .filter(|slug| !slug.is_empty())
        .map(EnrichmentKey::Issuer)
        .ok_or(ValidationError::MissingKey)
}

fn text(record: &RawRecord, aliases: &[&str]) -> Option<String> {
    first_text(record, aliases)
}

fn date(record: &RawRecord, aliases: &[&str]) -> Option<chrono::NaiveDate> {
    first_non_empty(record, aliases).and_then(parse_date)
}

fn amount(record: &RawRecord, aliases: &[&str]) -> Option<f64> {
    first_non_empty(record, aliases).and_then(parse_amount)
}

fn active_security(record: &RawRecord) -> BondPatch {
    BondPatch {
        issuer_name: text(record, fields::ISSUER_NAME),
        sector: text(record, fields::SECTOR),
        issuer_type: text(record, fields::ISSUER_TYPE),
        ownership_label: text(record, fields::OWNERSHIP),
        description: text(record, fields::DESCRIPTION),
        face_value: amount(record, fields::FACE_VALUE),
        issue_size: amount(record, fields::ISSUE_SIZE),
        min_investment: amount(record, fields::MIN_INVESTMENT),
        bond_type_label: text(record, fields::BOND_TYPE),
        tax_free: first_non_empty(record, fields::TAX_FREE).and_then(parse_flag),
        is_restructured: first_non_empty(record, fields::RESTRUCTURED).and_then(parse_flag),
        ..rating(record).with(coupon_terms(record))
    }
}

fn coupon_terms(record: &RawRecord) -> BondPatch {
    BondPatch {
        coupon_rate: first_non_empty(record, fields::COUPON_RATE).and_then(parse_percent),
        coupon_type: text(record, fields::COUPON_TYPE).and_then(|s| parse_coupon_type(&s)),
        coupon_frequency: text(record, fields::COUPON_FREQUENCY).and_then(|s| parse_frequency(&s)),
        maturity_date: date(record, fields::MATURITY_DATE),
        issue_date: date(record, fields::ISSUE_DATE),
        ..BondPatch::default()
    }
}

fn rating(record: &RawRecord) -> BondPatch {
    BondPatch {
        credit_rating: text(record, fields::CREDIT_RATING),
        rating_agency: text(record, fields::RATING_AGENCY),
        rating_date: date(record, fields::RATING_DATE),
        ..BondPatch::default()
    }
}

/// The issuer category comes from the row when present, otherwise from the
/// category the list was requested for.
fn issuer_type(tagged: &TaggedRecord) -> BondPatch {
    let record = &tagged.record;
    BondPatch {
        issuer_type: text(record, fields::ISSUER_TYPE)
            .or_else(|| tagged.context.get(ISSUER_CATEGORY_PARAM).cloned()),
        ownership_label: text(record, fields::OWNERSHIP),
        sector: text(record, fields::SECTOR),
        ..BondPatch::default()
    }
}

/// Membership in the restructured set means restructured, unless the row
/// explicitly says otherwise.
fn restructured(record: &RawRecord) -> BondPatch {
    BondPatch {
        is_restructured: Some(
            first_non_empty(record, fields::RESTRUCTURED)
                .and_then(parse_flag)
                .unwrap_or(true),
        ),
        ..BondPatch::default()
    }
}

impl BondPatch {
    fn with(mut self, other: BondPatch) -> BondPatch {
        self.overlay(other);
        self
    }
}

/// One skipped record and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub source: SourceEndpoint,
    pub reason: String,
}

/// Transformed output of one sync run, ready to merge.
#[derive(Debug, Default)]
pub struct TransformBatch {
    pub primary: Vec<(Isin, BondPatch)>,
    pub maps: Vec<EnrichmentMap>,
    pub transformed: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Transform every record, isolating validation failures.
///
/// Enrichment rows are grouped into one map per source.
pub fn transform_all<'a>(records: impl IntoIterator<Item = &'a TaggedRecord>) -> TransformBatch {
    let mut batch = TransformBatch::default();

    for tagged in records {
        let (key, patch) = match extract(tagged) {
            Ok(extracted) => extracted,
            Err(e) => {
                debug!(source = %tagged.source, reason = %e, "record skipped");
                batch.skipped.push(SkippedRecord {
                    source: tagged.source,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        batch.transformed += 1;

        match (tagged.source.is_primary(), key) {
            (true, EnrichmentKey::Isin(isin)) => batch.primary.push((isin, patch)),
            (true, EnrichmentKey::Issuer(_)) => {
                // `extract` never keys a primary row by issuer.
                batch.transformed -= 1;
                batch.skipped.push(SkippedRecord {
                    source: tagged.source,
                    reason: ValidationError::MissingIsin.to_string(),
                });
            }
            (false, key) => {
                let idx = match batch.maps.iter().position(|m| m.source == tagged.source) {
                    Some(idx) => idx,
                    None => {
                        batch.maps.push(EnrichmentMap::new(tagged.source));
                        batch.maps.len() - 1
                    }
                };
                batch.maps[idx].insert(key, patch);
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CouponFrequency, CouponType};
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    fn tagged(source: SourceEndpoint, pairs: &[(&str, Value)]) -> TaggedRecord {
        TaggedRecord::new(source, pairs.iter().map(|(k, v)| (*k, v.clone())).collect())
    }

    #[test]
    fn primary_row_extracts_every_field_group() {
        let row = tagged(
            SourceEndpoint::ActiveSecurities,
            &[
                ("ISIN", json!(" ine002a07809 ")),
                ("Issuer Name", json!("Reliance Industries Ltd")),
                ("Coupon Rate (%)", json!("7.25")),
                ("Frequency of Interest Payment", json!("Annual")),
                ("Redemption Date", json!("15-03-2030")),
                ("Face Value (Rs.)", json!("1,000")),
                ("Credit Rating", json!("CRISIL AAA/Stable")),
            ],
        );
        let (key, patch) = extract(&row).unwrap();
        assert_eq!(key, EnrichmentKey::Isin(Isin::parse("INE002A07809").unwrap()));
        assert_eq!(patch.issuer_name.as_deref(), Some("Reliance Industries Ltd"));
        assert_eq!(patch.coupon_rate, Some(7.25));
        assert_eq!(patch.coupon_frequency, Some(CouponFrequency::Annual));
        assert_eq!(patch.maturity_date, NaiveDate::from_ymd_opt(2030, 3, 15));
        assert_eq!(patch.face_value, Some(1000.0));
        assert_eq!(patch.credit_rating.as_deref(), Some("CRISIL AAA/Stable"));
    }

    #[test]
    fn primary_row_without_isin_is_invalid() {
        let row = tagged(SourceEndpoint::ActiveSecurities, &[("Issuer Name", json!("X Ltd"))]);
        assert_eq!(extract(&row), Err(ValidationError::MissingIsin));
    }

    #[test]
    fn malformed_isin_is_invalid_everywhere() {
        let row = tagged(SourceEndpoint::Ratings, &[("ISIN", json!("INE002"))]);
        assert!(matches!(extract(&row), Err(ValidationError::InvalidIsin { .. })));
    }

    #[test]
    fn enrichment_row_falls_back_to_issuer_slug() {
        let row = tagged(
            SourceEndpoint::IssuerTypes,
            &[("issuerName", json!("Power Finance Corporation Limited"))],
        )
        .with_context(ISSUER_CATEGORY_PARAM, "PSU");
        let (key, patch) = extract(&row).unwrap();
        assert_eq!(key, EnrichmentKey::Issuer("power-finance-corp-ltd".into()));
        assert_eq!(patch.issuer_type.as_deref(), Some("PSU"));
        assert_eq!(patch.issuer_name, None);
    }

    #[test]
    fn enrichment_row_without_any_key_is_invalid() {
        let row = tagged(SourceEndpoint::Ratings, &[("rating", json!("AA"))]);
        assert_eq!(extract(&row), Err(ValidationError::MissingKey));
    }

    #[test]
    fn restructured_membership_defaults_to_true() {
        let row = tagged(SourceEndpoint::Restructured, &[("isin", json!("INE002A07809"))]);
        assert_eq!(extract(&row).unwrap().1.is_restructured, Some(true));
    }

    #[test]
    fn coupon_type_from_label() {
        let row = tagged(
            SourceEndpoint::CouponRates,
            &[("isin", json!("INE002A07809")), ("couponType", json!("Floating"))],
        );
        assert_eq!(extract(&row).unwrap().1.coupon_type, Some(CouponType::Floating));
    }

    #[test]
    fn transform_all_groups_and_isolates_failures() {
        let records = vec![
            tagged(SourceEndpoint::ActiveSecurities, &[("ISIN", json!("INE002A07809"))]),
            tagged(SourceEndpoint::ActiveSecurities, &[("ISIN", json!("bad"))]),
            tagged(
                SourceEndpoint::Ratings,
                &[("ISIN", json!("INE002A07809")), ("rating", json!("ICRA AAA"))],
            ),
            tagged(
                SourceEndpoint::Ratings,
                &[("ISIN", json!("INE002A07809")), ("rating", json!("CARE AA+"))],
            ),
        ];
        let batch = transform_all(&records);
        assert_eq!(batch.primary.len(), 1);
        assert_eq!(batch.transformed, 3);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.maps.len(), 1);
        let key = EnrichmentKey::Isin(Isin::parse("INE002A07809").unwrap());
        assert_eq!(
            batch.maps[0].get(&key).and_then(|p| p.credit_rating.as_deref()),
            Some("ICRA AAA;CARE AA+")
        );
    }
}
