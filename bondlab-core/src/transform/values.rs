//! Scalar value parsing: amounts, percentages, flags, coupon enums.

use crate::domain::{CouponFrequency, CouponType};
use serde_json::Value;

const CRORE: f64 = 10_000_000.0;
const LAKH: f64 = 100_000.0;

/// Unit suffixes, longest first so "crores" is not read as "cr" + "ores".
const UNITS: [(&str, f64); 7] = [
    ("crores", CRORE),
    ("crore", CRORE),
    ("lakhs", LAKH),
    ("lakh", LAKH),
    ("lacs", LAKH),
    ("lac", LAKH),
    ("cr", CRORE),
];

const CURRENCY_PREFIXES: [&str; 4] = ["rs.", "rs", "inr", "₹"];

/// Non-negative amount in rupees.
///
/// Accepts JSON numbers and text with thousand separators, a currency
/// marker and an optional crore/lakh unit: `"Rs. 1,000"`, `"500 Cr"`.
pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite() && *v >= 0.0),
        Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}

pub fn parse_amount_str(raw: &str) -> Option<f64> {
    let mut s = raw.trim().to_lowercase();
    for prefix in CURRENCY_PREFIXES {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.trim_start().to_string();
            break;
        }
    }

    let mut multiplier = 1.0;
    let trimmed = s.trim_end_matches('.').trim_end();
    for (unit, factor) in UNITS {
        if let Some(rest) = trimmed.strip_suffix(unit) {
            multiplier = factor;
            s = rest.to_string();
            break;
        }
    }

    let digits: String = s.chars().filter(|c| !matches!(c, ',' | ' ' | '_')).collect();
    let n: f64 = digits.parse().ok()?;
    (n.is_finite() && n >= 0.0).then_some(n * multiplier)
}

/// Non-negative percentage: `7.25`, `"7.25%"`, `"7.25 % p.a."`.
pub fn parse_percent(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite() && *v >= 0.0),
        Value::String(s) => {
            let lower = s.trim().to_lowercase();
            let lower = lower.trim_end_matches("p.a.").trim_end_matches("pa").trim();
            let lower = lower.trim_end_matches('%').trim();
            let n: f64 = lower.replace(',', "").parse().ok()?;
            (n.is_finite() && n >= 0.0).then_some(n)
        }
        _ => None,
    }
}

/// Yes/no flags in their many spellings.
pub fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "y" | "yes" | "true" | "1" | "restructured" | "tax free" | "tax-free" | "taxfree" => {
                Some(true)
            }
            "n" | "no" | "false" | "0" | "taxable" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn parse_coupon_type(raw: &str) -> Option<CouponType> {
    let s = raw.trim().to_lowercase();
    if s.contains("zero") || s.contains("deep discount") || s == "zcb" {
        Some(CouponType::Zero)
    } else if s.contains("float") || s.contains("variable") || s.contains("frn") || s.contains("linked")
    {
        Some(CouponType::Floating)
    } else if s.contains("fixed") {
        Some(CouponType::Fixed)
    } else {
        None
    }
}

pub fn parse_frequency(raw: &str) -> Option<CouponFrequency> {
    let s = raw.trim().to_lowercase();
    if s.contains("semi") || s.contains("half") {
        Some(CouponFrequency::SemiAnnual)
    } else if s.contains("quarter") {
        Some(CouponFrequency::Quarterly)
    } else if s.contains("month") {
        Some(CouponFrequency::Monthly)
    } else if s.contains("annual") || s.contains("year") {
        Some(CouponFrequency::Annual)
    } else {
        None
    }
}
