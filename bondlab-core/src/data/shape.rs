//! Response shape detection.
//!
//! The upstream answers an expired session with a 200 and an HTML login page
//! (or, on spreadsheet downloads, a small JSON error envelope). The status
//! code alone is therefore not trustworthy; the body bytes decide.

use super::transport::HttpResponse;

/// What a response body looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Empty,
    Json,
    /// HTML or other markup where data was expected.
    ErrorPage,
    /// XLSX (zip container).
    Spreadsheet,
    /// UTF-8 delimited text.
    Delimited,
    Unknown,
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn detect_shape(resp: &HttpResponse) -> ResponseShape {
    if resp.body.starts_with(ZIP_MAGIC) {
        return ResponseShape::Spreadsheet;
    }

    let body = resp.body.strip_prefix(UTF8_BOM).unwrap_or(resp.body.as_slice());
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let body = &body[start..];

    if body.is_empty() {
        return ResponseShape::Empty;
    }

    match body[0] {
        b'{' | b'[' => return ResponseShape::Json,
        b'<' => return ResponseShape::ErrorPage,
        _ => {}
    }

    let is_html = resp
        .content_type
        .as_deref()
        .map(|ct| ct.to_ascii_lowercase().contains("html"))
        .unwrap_or(false);
    if is_html {
        return ResponseShape::ErrorPage;
    }

    if std::str::from_utf8(body).is_ok() {
        ResponseShape::Delimited
    } else {
        ResponseShape::Unknown
    }
}
