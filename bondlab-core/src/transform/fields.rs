//! Field alias tables.
//!
//! Endpoints name the same concept differently, and have renamed fields over
//! time. Each concept lists its known names in priority order; lookups match
//! keys ignoring case, whitespace and punctuation (`"Maturity Date"`,
//! `"maturityDate"` and `"MATURITY_DATE"` are the same key) and return the
//! first alias with a non-blank value.
//!
//! Changing an order here changes output for records that carry several
//! aliases with different values, so orders are append-only.

use crate::domain::RawRecord;
use serde_json::Value;

pub const ISIN: &[&str] = &["ISIN", "ISIN No", "ISIN Code", "Security ISIN"];

pub const ISSUER_NAME: &[&str] = &[
    "Issuer Name",
    "Name of Issuer",
    "Issuer",
    "Company Name",
    "Borrower Name",
];

pub const DESCRIPTION: &[&str] = &[
    "Security Description",
    "Instrument Description",
    "Security Name",
    "Name of Instrument",
    "Description",
];

pub const COUPON_RATE: &[&str] = &[
    "Coupon Rate",
    "Coupon Rate (%)",
    "Interest Rate",
    "Rate of Interest",
    "Coupon",
];

pub const COUPON_TYPE: &[&str] = &["Coupon Type", "Interest Type", "Coupon Basis", "Rate Type"];

pub const COUPON_FREQUENCY: &[&str] = &[
    "Frequency of Interest Payment",
    "Interest Payment Frequency",
    "Coupon Frequency",
    "Interest Frequency",
    "Frequency",
];

/// Maturity has gone by four names across endpoint versions.
pub const MATURITY_DATE: &[&str] = &[
    "Maturity Date",
    "Redemption Date",
    "Date of Maturity",
    "Final Redemption Date",
];

pub const ISSUE_DATE: &[&str] = &[
    "Issue Date",
    "Date of Allotment",
    "Allotment Date",
    "Date of Issue",
];

pub const FACE_VALUE: &[&str] = &[
    "Face Value",
    "Face Value (Rs.)",
    "Face Value Per Unit",
    "Nominal Value",
];

pub const ISSUE_SIZE: &[&str] = &[
    "Issue Size",
    "Issue Size (Rs.)",
    "Issue Amount",
    "Amount Issued",
    "Total Issue Size",
];

pub const MIN_INVESTMENT: &[&str] = &[
    "Minimum Investment",
    "Minimum Application Size",
    "Minimum Application",
    "Market Lot",
];

pub const CREDIT_RATING: &[&str] = &["Credit Rating", "Current Rating", "Rating", "Ratings"];

pub const RATING_AGENCY: &[&str] = &[
    "Rating Agency",
    "Credit Rating Agency",
    "Agency Name",
    "Agency",
];

pub const RATING_DATE: &[&str] = &["Rating Date", "Date of Rating", "Rating Assigned Date"];

pub const SECTOR: &[&str] = &["Sector", "Industry", "Industry Sector"];

pub const ISSUER_TYPE: &[&str] = &[
    "Issuer Type",
    "Type of Issuer",
    "Issuer Category",
    "Category",
];

pub const OWNERSHIP: &[&str] = &["Ownership", "Ownership Type", "Issuer Ownership"];

pub const BOND_TYPE: &[&str] = &["Bond Type", "Instrument Type", "Security Type", "Type"];

pub const TAX_FREE: &[&str] = &["Tax Free", "Tax Free Bond", "Tax Status"];

pub const RESTRUCTURED: &[&str] = &["Restructured", "Is Restructured", "Restructuring Status"];

/// Lowercase ASCII alphanumerics only.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Whether a value carries nothing: null, or a blank or placeholder string.
pub fn is_blank_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let t = s.trim();
            t.is_empty() || t == "-" || t == "--" || t.eq_ignore_ascii_case("n/a") || t.eq_ignore_ascii_case("na")
        }
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// First non-blank value among `aliases`, in alias order.
pub fn first_non_empty<'a>(record: &'a RawRecord, aliases: &[&str]) -> Option<&'a Value> {
    let keyed: Vec<(String, &Value)> = record
        .iter()
        .map(|(k, v)| (normalize_key(k), v))
        .collect();

    aliases.iter().find_map(|alias| {
        let alias = normalize_key(alias);
        keyed
            .iter()
            .find(|(k, v)| *k == alias && !is_blank_value(v))
            .map(|(_, v)| *v)
    })
}

/// [`first_non_empty`] rendered as trimmed text.
pub fn first_text(record: &RawRecord, aliases: &[&str]) -> Option<String> {
    first_non_empty(record, aliases).and_then(value_text)
}

/// Scalar value as trimmed text; `None` for blanks and containers.
pub fn value_text(value: &Value) -> Option<String> {
    if is_blank_value(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> RawRecord {
        pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    #[test]
    fn keys_match_across_naming_styles() {
        assert_eq!(normalize_key("Maturity Date"), "maturitydate");
        assert_eq!(normalize_key("maturityDate"), "maturitydate");
        assert_eq!(normalize_key("MATURITY_DATE"), "maturitydate");
        assert_eq!(normalize_key("Face Value (Rs.)"), "facevaluers");
    }

    #[test]
    fn alias_priority_wins_over_record_order() {
        let r = record(&[
            ("redemptionDate", json!("01-01-2031")),
            ("MATURITY DATE", json!("01-01-2030")),
        ]);
        assert_eq!(first_non_empty(&r, MATURITY_DATE), Some(&json!("01-01-2030")));
    }

    #[test]
    fn blank_candidates_are_skipped() {
        let r = record(&[
            ("Maturity Date", json!("  ")),
            ("Redemption Date", json!("NA")),
            ("Date of Maturity", json!("2030-01-01")),
        ]);
        assert_eq!(first_text(&r, MATURITY_DATE).as_deref(), Some("2030-01-01"));
    }

    #[test]
    fn numbers_render_as_text() {
        let r = record(&[("Coupon", json!(7.25))]);
        assert_eq!(first_text(&r, COUPON_RATE).as_deref(), Some("7.25"));
        assert_eq!(first_text(&r, ISIN), None);
    }
}
