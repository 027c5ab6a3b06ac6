//! The canonical bond record produced by a sync run.

use super::endpoint::SourceEndpoint;
use super::ids::Isin;
use crate::rating::Grade;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ownership of the issuing entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    Private,
    Psu,
    Government,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponType {
    #[default]
    Fixed,
    Floating,
    Zero,
}

/// Coupon payment frequency. Unset is `Option::None` on the bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CouponFrequency {
    Annual,
    SemiAnnual,
    Quarterly,
    Monthly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BondType {
    #[default]
    Corporate,
    Psu,
    Gsec,
    Sdl,
    TaxFree,
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Ownership::Private => "private",
            Ownership::Psu => "psu",
            Ownership::Government => "government",
            Ownership::Unknown => "unknown",
        })
    }
}

impl fmt::Display for BondType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BondType::Corporate => "corporate",
            BondType::Psu => "psu",
            BondType::Gsec => "gsec",
            BondType::Sdl => "sdl",
            BondType::TaxFree => "tax-free",
        })
    }
}

/// Issuer sub-record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issuer {
    /// Slug generated from the display name.
    pub id: String,
    pub name: String,
    pub sector: Option<String>,
    pub ownership: Ownership,
    pub issuer_type: Option<String>,
    pub latest_rating: Option<String>,
}

/// Where a record came from and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub primary_source: SourceEndpoint,
    /// Every endpoint that contributed at least one field, in merge order.
    pub sources: Vec<SourceEndpoint>,
    pub last_synced_at: DateTime<Utc>,
}

/// One bond, reconciled across endpoints. Keyed by ISIN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalBond {
    pub isin: Isin,
    pub issuer: Issuer,
    pub description: Option<String>,
    pub coupon_rate: Option<f64>,
    pub coupon_type: CouponType,
    pub coupon_frequency: Option<CouponFrequency>,
    pub maturity_date: Option<NaiveDate>,
    pub issue_date: Option<NaiveDate>,
    pub face_value: Option<f64>,
    pub issue_size: Option<f64>,
    pub min_investment: Option<f64>,
    /// Raw agency string(s), `;`-separated when several agencies rate the bond.
    pub credit_rating: Option<String>,
    pub rating_agency: Option<String>,
    pub rating_date: Option<NaiveDate>,
    pub normalized_rating: Grade,
    /// Rank of `normalized_rating`, stored for sorting.
    pub rating_rank: u32,
    pub is_active: bool,
    pub is_restructured: bool,
    pub bond_type: BondType,
    pub provenance: Provenance,
}

impl CanonicalBond {
    /// Active unless the maturity date is before `today`. Bonds without a
    /// maturity date come from the active listing and stay active.
    pub fn active_on(maturity: Option<NaiveDate>, today: NaiveDate) -> bool {
        maturity.map_or(true, |m| m >= today)
    }
}

/// Sort best-rated first; ties break on ISIN so output is stable.
pub fn sort_best_rated_first(bonds: &mut [CanonicalBond]) {
    bonds.sort_by(|a, b| {
        a.rating_rank
            .cmp(&b.rating_rank)
            .then_with(|| a.isin.cmp(&b.isin))
    });
}
