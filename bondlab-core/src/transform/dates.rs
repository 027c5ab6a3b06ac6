//! Calendar-date parsing.
//!
//! Forms are told apart by shape, never by locale: a four-digit leading
//! component is year-first, anything else with a four-digit trailing
//! component is day-first. Unparseable input is `None`.

use chrono::{DateTime, Duration, NaiveDate};
use serde_json::Value;

/// Spreadsheet serial day numbers count from this date (1900 date system,
/// including its phantom leap day).
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Largest serial a spreadsheet can hold (9999-12-31).
const MAX_SERIAL: f64 = 2_958_465.0;

/// Numbers above this are epoch milliseconds rather than serial days.
const EPOCH_MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => n.as_f64().and_then(from_number),
        _ => None,
    }
}

pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // ISO date-time separator; month names like "OCT" keep their 'T'.
    let s = match s.find('T') {
        Some(i) if i > 0 && s.as_bytes()[i - 1].is_ascii_digit() => {
            format!("{} {}", &s[..i], &s[i + 1..])
        }
        _ => s.to_string(),
    };

    let parts: Vec<&str> = s
        .split(|c: char| matches!(c, '-' | '/' | '.' | ' ' | ','))
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() < 3 {
        return None;
    }
    // Anything after the date must look like a time of day.
    if !parts[3..]
        .iter()
        .all(|p| p.contains(':') || p.eq_ignore_ascii_case("z") || p.ends_with('Z'))
    {
        return None;
    }

    let (a, b, c) = (parts[0], parts[1], parts[2]);
    if is_digits(a, 4) {
        let (y, m, d) = (a.parse().ok()?, number(b)?, number(c)?);
        NaiveDate::from_ymd_opt(y, m, d)
    } else if is_digits(c, 4) {
        let d = number(a)?;
        let m = number(b).or_else(|| month_name(b))?;
        NaiveDate::from_ymd_opt(c.parse().ok()?, m, d)
    } else {
        None
    }
}

fn from_number(n: f64) -> Option<NaiveDate> {
    if !n.is_finite() || n <= 0.0 {
        return None;
    }
    if n >= EPOCH_MILLIS_THRESHOLD {
        return DateTime::from_timestamp_millis(n as i64).map(|dt| dt.date_naive());
    }
    if n > MAX_SERIAL {
        return None;
    }
    let (y, m, d) = SERIAL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_signed(Duration::days(n.trunc() as i64))
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

fn number(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn month_name(s: &str) -> Option<u32> {
    if s.len() < 3 {
        return None;
    }
    let prefix = s.get(..3)?.to_ascii_lowercase();
    let idx = MONTHS.iter().position(|m| *m == prefix)?;
    let full = s.to_ascii_lowercase();
    // "Mar", "March" and "Sept" are fine; "Marble" is not.
    let known_long = [
        "january", "february", "march", "april", "may", "june", "july", "august", "september",
        "sept", "october", "november", "december",
    ];
    if full.len() == 3 || known_long.contains(&full.as_str()) {
        Some(idx as u32 + 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn iso_and_day_first_forms() {
        assert_eq!(parse_date_str("2030-03-15"), ymd(2030, 3, 15));
        assert_eq!(parse_date_str("15-03-2030"), ymd(2030, 3, 15));
        assert_eq!(parse_date_str("15/03/2030"), ymd(2030, 3, 15));
        assert_eq!(parse_date_str("15.03.2030"), ymd(2030, 3, 15));
        assert_eq!(parse_date_str("05/11/2030"), ymd(2030, 11, 5));
    }

    #[test]
    fn time_suffixes_and_month_names() {
        assert_eq!(parse_date_str("2030-03-15T00:00:00"), ymd(2030, 3, 15));
        assert_eq!(parse_date_str("2030-03-15 10:30:00"), ymd(2030, 3, 15));
        assert_eq!(parse_date_str("2030-03-15T00:00:00.000Z"), ymd(2030, 3, 15));
        assert_eq!(parse_date_str("15-Mar-2030"), ymd(2030, 3, 15));
        assert_eq!(parse_date_str("15 March 2030"), ymd(2030, 3, 15));
        assert_eq!(parse_date_str("15 Sept 2030"), ymd(2030, 9, 15));
        assert_eq!(parse_date_str("01-OCT-2030"), ymd(2030, 10, 1));
    }

    #[test]
    fn garbage_is_none() {
        for s in ["", "perpetual", "31-02-2030", "2030-13-01", "15-Marble-2030", "15-03-30", "2030-03-15 foo"] {
            assert_eq!(parse_date_str(s), None, "{s}");
        }
    }

    #[test]
    fn numeric_forms() {
        // 2030-03-15 as a spreadsheet serial and as epoch millis.
        assert_eq!(parse_date(&json!(47557)), ymd(2030, 3, 15));
        assert_eq!(parse_date(&json!(1_899_763_200_000_i64)), ymd(2030, 3, 15));
        assert_eq!(parse_date(&json!(-1)), None);
        assert_eq!(parse_date(&json!(null)), None);
    }
}
