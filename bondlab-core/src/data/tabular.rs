//! Spreadsheet and delimited-text payloads → row records.
//!
//! The first non-empty row is the header. Header cells are trimmed, blank
//! headers become `column_<n>`, duplicates get a numeric suffix. Rows with no
//! non-blank cell are dropped.

use crate::domain::RawRecord;
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::io::Cursor;

/// Decode an XLSX workbook (first worksheet).
pub fn decode_xlsx(bytes: &[u8]) -> Result<Vec<RawRecord>, String> {
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(Cursor::new(bytes)).map_err(|e| format!("open workbook: {e}"))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "workbook has no worksheets".to_string())?
        .map_err(|e| format!("read worksheet: {e}"))?;

    let rows: Vec<Vec<Value>> = range
        .rows()
        .map(|row| row.iter().map(cell_value).collect())
        .collect();
    Ok(rows_to_records(rows))
}

/// Decode delimited text; the delimiter (comma, semicolon or tab) is sniffed
/// from the first non-empty line.
pub fn decode_delimited(bytes: &[u8]) -> Result<Vec<RawRecord>, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| format!("payload is not UTF-8: {e}"))?;
    let text = text.trim_start_matches('\u{feff}');
    let delimiter = sniff_delimiter(text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| format!("malformed row: {e}"))?;
        rows.push(
            record
                .iter()
                .map(|cell| {
                    let cell = cell.trim();
                    if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::String(cell.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(rows_to_records(rows))
}

fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|d| header.bytes().filter(|b| b == d).count())
        .filter(|d| header.bytes().any(|b| b == *d))
        .unwrap_or(b',')
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::Number((*i).into()),
        Data::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::String(s.trim().to_string()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => Number::from_f64(dt.as_f64())
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::DateTimeIso(s) => Value::String(s.clone()),
        _ => Value::Null,
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn rows_to_records(rows: Vec<Vec<Value>>) -> Vec<RawRecord> {
    let mut rows = rows.into_iter().skip_while(|r| r.iter().all(is_blank));
    let Some(header_row) = rows.next() else {
        return Vec::new();
    };
    let headers = header_names(&header_row);

    rows.filter(|r| !r.iter().all(is_blank))
        .map(|row| {
            headers
                .iter()
                .zip(row.into_iter().chain(std::iter::repeat(Value::Null)))
                .map(|(h, v)| (h.clone(), v))
                .collect()
        })
        .collect()
}

fn header_names(row: &[Value]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    row.iter()
        .enumerate()
        .map(|(i, v)| {
            let base = match v {
                Value::String(s) => s.trim().to_string(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            let base = if base.is_empty() {
                format!("column_{}", i + 1)
            } else {
                base
            };
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base}_{count}")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_comma_separated() {
        let text = b"ISIN,Issuer Name,Coupon\nINE002A07809,Reliance Industries Ltd,7.25\n,,\n";
        let rows = decode_delimited(text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("ISIN"), Some(&json!("INE002A07809")));
        assert_eq!(rows[0].get("Coupon"), Some(&json!("7.25")));
    }

    #[test]
    fn sniffs_semicolons_and_tabs() {
        let rows = decode_delimited(b"ISIN;Rating\nINE002A07809;AAA\n").unwrap();
        assert_eq!(rows[0].get("Rating"), Some(&json!("AAA")));
        let rows = decode_delimited(b"ISIN\tRating\nINE002A07809\tAA\n").unwrap();
        assert_eq!(rows[0].get("Rating"), Some(&json!("AA")));
    }

    #[test]
    fn short_rows_are_padded_and_duplicate_headers_suffixed() {
        let rows = decode_delimited(b"A,A,\n1\n").unwrap();
        assert_eq!(rows[0].get("A"), Some(&json!("1")));
        assert_eq!(rows[0].get("A_2"), Some(&Value::Null));
        assert_eq!(rows[0].get("column_3"), Some(&Value::Null));
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        assert!(decode_delimited(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn garbage_zip_is_an_error() {
        assert!(decode_xlsx(b"PK\x03\x04not really a workbook").is_err());
    }
}
