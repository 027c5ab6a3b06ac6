use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Why a transformed record cannot become (part of) a canonical bond.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("record has no ISIN")]
    MissingIsin,

    #[error("invalid ISIN '{value}': {reason}")]
    InvalidIsin { value: String, reason: &'static str },

    #[error("record has neither ISIN nor issuer name")]
    MissingKey,
}

/// International Securities Identification Number.
///
/// Always stored uppercase, 12 ASCII alphanumerics: two-letter country code,
/// nine alphanumerics, one check digit. The check digit itself is not
/// verified; the upstream occasionally publishes test ISINs that fail it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isin(String);

impl Isin {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let value: String = raw
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        let invalid = |reason| ValidationError::InvalidIsin {
            value: raw.trim().to_string(),
            reason,
        };

        if value.is_empty() {
            return Err(ValidationError::MissingIsin);
        }
        if value.len() != 12 {
            return Err(invalid("must be 12 characters"));
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid("must be alphanumeric"));
        }
        let bytes = value.as_bytes();
        if !bytes[0].is_ascii_alphabetic() || !bytes[1].is_ascii_alphabetic() {
            return Err(invalid("must start with a country code"));
        }
        if !bytes[11].is_ascii_digit() {
            return Err(invalid("must end with a check digit"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Isin {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Isin {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Isin> for String {
    fn from(isin: Isin) -> Self {
        isin.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let isin = Isin::parse("  ine002a07809 ").unwrap();
        assert_eq!(isin.as_str(), "INE002A07809");
    }

    #[test]
    fn rejects_bad_shapes() {
        assert_eq!(Isin::parse(""), Err(ValidationError::MissingIsin));
        assert!(Isin::parse("INE002A0780").is_err());
        assert!(Isin::parse("INE002A0780X").is_err());
        assert!(Isin::parse("1NE002A07809").is_err());
        assert!(Isin::parse("INE002-07809").is_err());
    }

    #[test]
    fn serde_validates() {
        let ok: Isin = serde_json::from_str("\"INE002A07809\"").unwrap();
        assert_eq!(ok.to_string(), "INE002A07809");
        assert!(serde_json::from_str::<Isin>("\"nope\"").is_err());
    }
}
