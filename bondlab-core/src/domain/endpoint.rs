use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical upstream dataset a record came from.
///
/// Variant order is the enrichment merge order: the primary listing first,
/// then coupon terms, ratings, issuer classification and finally the
/// restructured set. Changing it changes output for conflicting inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceEndpoint {
    /// Active securities listing (spreadsheet download). Primary record set.
    ActiveSecurities,
    /// Interest-rate-wise listing: coupon rate, type and frequency.
    CouponRates,
    /// Rating-wise listing: agency ratings per ISIN.
    Ratings,
    /// Issuer-type-wise listing: issuer category per issuer.
    IssuerTypes,
    /// ISINs flagged as restructured.
    Restructured,
}

impl SourceEndpoint {
    pub const ALL: [SourceEndpoint; 5] = [
        SourceEndpoint::ActiveSecurities,
        SourceEndpoint::CouponRates,
        SourceEndpoint::Ratings,
        SourceEndpoint::IssuerTypes,
        SourceEndpoint::Restructured,
    ];

    /// Enrichment sources in the order they are applied.
    pub const MERGE_ORDER: [SourceEndpoint; 4] = [
        SourceEndpoint::CouponRates,
        SourceEndpoint::Ratings,
        SourceEndpoint::IssuerTypes,
        SourceEndpoint::Restructured,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceEndpoint::ActiveSecurities => "active-securities",
            SourceEndpoint::CouponRates => "coupon-rates",
            SourceEndpoint::Ratings => "ratings",
            SourceEndpoint::IssuerTypes => "issuer-types",
            SourceEndpoint::Restructured => "restructured",
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, SourceEndpoint::ActiveSecurities)
    }
}

impl fmt::Display for SourceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceEndpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        SourceEndpoint::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| format!("unknown dataset '{s}'"))
    }
}
