//! Free-text rating string → canonical [`Grade`].
//!
//! Upstream rating strings mix agency names, outlooks, credit-enhancement
//! suffixes and several agencies in one field, e.g.
//! `"ICRA AAA/Stable; CRISIL AAA (CE)/Stable"`. Normalization is a pure,
//! total function: it never fails, and anything it cannot place comes back
//! as [`Grade::Unrecognized`] carrying the cleaned remainder.

use super::grade::{Grade, LADDER};
use std::cmp::Ordering;

/// Markers of a withdrawn rating or a non-cooperating issuer.
const WITHDRAWN_TOKENS: &[&str] = &["WITHDRAWN", "WD", "SUSPENDED", "INC", "ISSUERNOTCOOPERATING"];

/// Substrings that mark withdrawal anywhere in the cleaned string.
const WITHDRAWN_MARKERS: &[&str] = &["WITHDRAWN", "ISSUERNOTCOOPERATING", "NOTCOOPERATING"];

/// Explicit "no rating" tokens.
const UNRATED_TOKENS: &[&str] = &["UNRATED", "NOTRATED", "NR", "NA", "N.A.", "NIL", "-", "--"];

/// Rating agency names and abbreviations as they appear glued to grades.
const AGENCIES: &[&str] = &[
    "INDIARATINGSANDRESEARCH",
    "INDIARATINGS",
    "CARERATINGS",
    "BRICKWORKRATINGS",
    "BRICKWORK",
    "INFOMERICS",
    "ACUITERATINGS",
    "ACUITE",
    "CRISIL",
    "FITCH",
    "MOODYS",
    "SMERA",
    "CARE",
    "ICRA",
    "BWR",
    "IVR",
    "IND",
    "S&P",
];

const PROVISIONAL: &[&str] = &["PROVISIONAL", "PROV"];

const COUNTRY_PREFIXES: &[&str] = &["IND"];

const PP_MLD_MARKERS: &[&str] = &["PP-MLD", "PPMLD"];

/// Trailing outlook and support-structure markers, longest first.
const SUFFIXES: &[&str] = &[
    "WITHDEVELOPINGIMPLICATIONS",
    "WITHNEGATIVEIMPLICATIONS",
    "WITHPOSITIVEIMPLICATIONS",
    "RATINGWATCH",
    "DEVELOPING",
    "NEGATIVE",
    "POSITIVE",
    "STABLE",
    "WATCH",
    "CWDI",
    "CWNI",
    "CWPI",
    "RWD",
    "RWE",
    "RWN",
    "RWP",
    "SO",
    "CE",
];

const MAX_SUFFIX_PASSES: usize = 3;

/// Normalize one rating string.
///
/// Returns `None` only for blank input.
pub fn normalize_rating(raw: &str) -> Option<Grade> {
    let cleaned = clean(raw);
    if cleaned.is_empty() {
        return None;
    }

    if UNRATED_TOKENS.contains(&cleaned.as_str()) {
        return Some(Grade::Unrated);
    }
    if is_withdrawn(&cleaned) {
        return Some(Grade::Withdrawn);
    }

    let rest = strip_agency(&cleaned);

    if PP_MLD_MARKERS.iter().any(|m| rest.contains(m)) {
        return Some(Grade::PpMld);
    }

    let rest = strip_suffixes(rest);
    if rest.is_empty() {
        return Some(Grade::Unrated);
    }
    if UNRATED_TOKENS.contains(&rest) {
        return Some(Grade::Unrated);
    }

    Some(match_ladder(rest).unwrap_or_else(|| Grade::Unrecognized(rest.to_string())))
}

/// Rank of a free-text rating; blank input ranks as unrated.
pub fn rank_of_rating(raw: &str) -> u32 {
    normalize_rating(raw).unwrap_or(Grade::Unrated).rank()
}

/// Best-first comparison of two free-text ratings.
pub fn compare_ratings(a: &str, b: &str) -> Ordering {
    rank_of_rating(a).cmp(&rank_of_rating(b))
}

/// First agency, before the outlook; uppercase without decoration.
fn clean(raw: &str) -> String {
    let first = raw.split(';').next().unwrap_or("");
    let first = first.split('/').next().unwrap_or("");
    first
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '*' | '(' | ')' | '[' | ']'))
        .flat_map(char::to_uppercase)
        .collect()
}

fn is_withdrawn(cleaned: &str) -> bool {
    WITHDRAWN_TOKENS.contains(&cleaned) || WITHDRAWN_MARKERS.iter().any(|m| cleaned.contains(m))
}

fn strip_agency(s: &str) -> &str {
    let mut rest = strip_longest_prefix(s, PROVISIONAL);
    rest = strip_longest_prefix(rest, AGENCIES);
    rest = strip_longest_prefix(rest, PROVISIONAL);
    if rest.len() > 3 {
        rest = strip_longest_prefix(rest, COUNTRY_PREFIXES);
    }
    rest
}

fn strip_longest_prefix<'a>(s: &'a str, candidates: &[&str]) -> &'a str {
    candidates
        .iter()
        .filter(|c| s.starts_with(*c))
        .max_by_key(|c| c.len())
        .map(|c| &s[c.len()..])
        .unwrap_or(s)
}

fn strip_suffixes(mut s: &str) -> &str {
    for _ in 0..MAX_SUFFIX_PASSES {
        let before = s.len();
        if let Some(suffix) = SUFFIXES.iter().find(|suf| s.len() > suf.len() && s.ends_with(*suf)) {
            s = &s[..s.len() - suffix.len()];
        }
        s = s.trim_end_matches([',', '.', ':']);
        if s.len() == before {
            break;
        }
    }
    s
}

/// Exact match first, then longest ladder prefix not followed by a digit.
fn match_ladder(s: &str) -> Option<Grade> {
    if let Some(g) = Grade::from_ladder_str(s) {
        return Some(g);
    }
    let mut by_length: Vec<&Grade> = LADDER.iter().collect();
    by_length.sort_by_key(|g| std::cmp::Reverse(g.as_str().len()));
    by_length.into_iter().find_map(|g| {
        let code = g.as_str();
        let tail = s.strip_prefix(code)?;
        if tail.starts_with(|c: char| c.is_ascii_digit()) {
            None
        } else {
            Some(g.clone())
        }
    })
}
