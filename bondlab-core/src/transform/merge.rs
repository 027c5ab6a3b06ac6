//! Partial records, enrichment maps and the merge into canonical bonds.
//!
//! Every pass goes through [`BondPatch::overlay`]: a field is replaced only
//! by a present, non-blank value. An earlier non-empty value is never
//! blanked by a later pass.

use super::classify::{ClassifyInput, IssuerClassifier};
use super::slug::issuer_slug;
use crate::domain::{
    CanonicalBond, CouponFrequency, CouponType, Isin, Issuer, Provenance, SourceEndpoint,
};
use crate::rating::{normalize_rating, Grade};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// The subset of canonical fields one record contributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BondPatch {
    pub issuer_name: Option<String>,
    pub sector: Option<String>,
    pub issuer_type: Option<String>,
    pub ownership_label: Option<String>,
    pub description: Option<String>,
    pub coupon_rate: Option<f64>,
    pub coupon_type: Option<CouponType>,
    pub coupon_frequency: Option<CouponFrequency>,
    pub maturity_date: Option<NaiveDate>,
    pub issue_date: Option<NaiveDate>,
    pub face_value: Option<f64>,
    pub issue_size: Option<f64>,
    pub min_investment: Option<f64>,
    pub credit_rating: Option<String>,
    pub rating_agency: Option<String>,
    pub rating_date: Option<NaiveDate>,
    pub bond_type_label: Option<String>,
    pub tax_free: Option<bool>,
    pub is_restructured: Option<bool>,
}

/// Whether a value counts as "present" for overlay purposes.
pub trait Present {
    fn is_present(&self) -> bool;
}

impl Present for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl Present for f64 {
    fn is_present(&self) -> bool {
        self.is_finite()
    }
}

macro_rules! always_present {
    ($($t:ty),+) => {
        $(impl Present for $t {
            fn is_present(&self) -> bool {
                true
            }
        })+
    };
}

always_present!(bool, NaiveDate, CouponType, CouponFrequency);

fn put<T: Present>(slot: &mut Option<T>, value: Option<T>) {
    if let Some(v) = value {
        if v.is_present() {
            *slot = Some(v);
        }
    }
}

impl BondPatch {
    /// Apply `other` on top of `self`, non-destructively.
    pub fn overlay(&mut self, other: BondPatch) {
        // Destructured so a new field cannot be forgotten here.
        let BondPatch {
            issuer_name,
            sector,
            issuer_type,
            ownership_label,
            description,
            coupon_rate,
            coupon_type,
            coupon_frequency,
            maturity_date,
            issue_date,
            face_value,
            issue_size,
            min_investment,
            credit_rating,
            rating_agency,
            rating_date,
            bond_type_label,
            tax_free,
            is_restructured,
        } = other;

        put(&mut self.issuer_name, issuer_name);
        put(&mut self.sector, sector);
        put(&mut self.issuer_type, issuer_type);
        put(&mut self.ownership_label, ownership_label);
        put(&mut self.description, description);
        put(&mut self.coupon_rate, coupon_rate);
        put(&mut self.coupon_type, coupon_type);
        put(&mut self.coupon_frequency, coupon_frequency);
        put(&mut self.maturity_date, maturity_date);
        put(&mut self.issue_date, issue_date);
        put(&mut self.face_value, face_value);
        put(&mut self.issue_size, issue_size);
        put(&mut self.min_investment, min_investment);
        put(&mut self.credit_rating, credit_rating);
        put(&mut self.rating_agency, rating_agency);
        put(&mut self.rating_date, rating_date);
        put(&mut self.bond_type_label, bond_type_label);
        put(&mut self.tax_free, tax_free);
        put(&mut self.is_restructured, is_restructured);
    }

    /// Combine two rows of the same source for the same key.
    ///
    /// Ratings from several agencies accumulate into one `;`-separated
    /// string (distinct values, arrival order); every other field overlays.
    pub fn absorb(&mut self, mut other: BondPatch) {
        let rating = other.credit_rating.take();
        let agency = other.rating_agency.take();
        self.overlay(other);
        append_distinct(&mut self.credit_rating, rating);
        append_distinct(&mut self.rating_agency, agency);
    }

    pub fn is_empty(&self) -> bool {
        *self == BondPatch::default()
    }
}

fn append_distinct(slot: &mut Option<String>, value: Option<String>) {
    let Some(value) = value.filter(Present::is_present) else {
        return;
    };
    match slot {
        Some(existing) if existing.trim().is_empty() => *existing = value,
        Some(existing) => {
            let known = existing.split(';').any(|p| p.trim() == value.trim());
            if !known {
                existing.push(';');
                existing.push_str(value.trim());
            }
        }
        None => *slot = Some(value.trim().to_string()),
    }
}

/// How an enrichment entry finds its bond.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnrichmentKey {
    Isin(Isin),
    /// Issuer slug, for rows without an ISIN.
    Issuer(String),
}

/// One secondary dataset, keyed for lookup during the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentMap {
    pub source: SourceEndpoint,
    by_isin: BTreeMap<Isin, BondPatch>,
    by_issuer: BTreeMap<String, BondPatch>,
}

impl EnrichmentMap {
    pub fn new(source: SourceEndpoint) -> Self {
        Self {
            source,
            by_isin: BTreeMap::new(),
            by_issuer: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: EnrichmentKey, patch: BondPatch) {
        let slot = match key {
            EnrichmentKey::Isin(isin) => self.by_isin.entry(isin).or_default(),
            EnrichmentKey::Issuer(slug) => self.by_issuer.entry(slug).or_default(),
        };
        slot.absorb(patch);
    }

    pub fn get(&self, key: &EnrichmentKey) -> Option<&BondPatch> {
        match key {
            EnrichmentKey::Isin(isin) => self.by_isin.get(isin),
            EnrichmentKey::Issuer(slug) => self.by_issuer.get(slug),
        }
    }

    pub fn len(&self) -> usize {
        self.by_isin.len() + self.by_issuer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A bond between merge and finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialBond {
    pub isin: Isin,
    pub patch: BondPatch,
    /// Contributing sources, primary first, in merge order.
    pub sources: Vec<SourceEndpoint>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub bonds: usize,
    /// Primary rows folded into an earlier row with the same ISIN.
    pub duplicate_primary_rows: usize,
    /// Enrichment entries applied to at least one bond.
    pub applied: usize,
    /// Enrichment entries that matched no bond.
    pub orphaned: usize,
}

/// Merge primary rows with enrichment maps.
///
/// Primary rows sharing an ISIN collapse into one bond. Maps are applied in
/// [`SourceEndpoint`] order regardless of the order given. Within a map, an
/// issuer-keyed entry is applied before the ISIN-keyed one so the more
/// specific entry wins. Output is sorted by ISIN.
pub fn merge_records(
    primary: Vec<(Isin, BondPatch)>,
    mut maps: Vec<EnrichmentMap>,
) -> (Vec<PartialBond>, MergeStats) {
    let mut stats = MergeStats::default();
    let mut bonds: BTreeMap<Isin, PartialBond> = BTreeMap::new();

    for (isin, patch) in primary {
        match bonds.get_mut(&isin) {
            Some(existing) => {
                stats.duplicate_primary_rows += 1;
                existing.patch.overlay(patch);
            }
            None => {
                bonds.insert(
                    isin.clone(),
                    PartialBond {
                        isin,
                        patch,
                        sources: vec![SourceEndpoint::ActiveSecurities],
                    },
                );
            }
        }
    }

    maps.sort_by_key(|m| m.source);
    for map in &maps {
        let mut used: BTreeSet<EnrichmentKey> = BTreeSet::new();
        for bond in bonds.values_mut() {
            let mut keys = Vec::with_capacity(2);
            if let Some(name) = &bond.patch.issuer_name {
                let slug = issuer_slug(name);
                if !slug.is_empty() {
                    keys.push(EnrichmentKey::Issuer(slug));
                }
            }
            keys.push(EnrichmentKey::Isin(bond.isin.clone()));

            for key in keys {
                if let Some(patch) = map.get(&key) {
                    bond.patch.overlay(patch.clone());
                    if !bond.sources.contains(&map.source) {
                        bond.sources.push(map.source);
                    }
                    used.insert(key);
                }
            }
        }
        stats.applied += used.len();
        stats.orphaned += map.len() - used.len();
    }

    stats.bonds = bonds.len();
    (bonds.into_values().collect(), stats)
}

/// Derive the canonical record from a merged partial.
pub fn finalize(
    bond: PartialBond,
    classifier: &dyn IssuerClassifier,
    synced_at: DateTime<Utc>,
) -> CanonicalBond {
    let PartialBond {
        isin,
        patch,
        sources,
    } = bond;

    let name = patch
        .issuer_name
        .clone()
        .unwrap_or_else(|| "Unknown issuer".to_string());
    let slug = match issuer_slug(&name) {
        s if s.is_empty() || patch.issuer_name.is_none() => isin.as_str().to_ascii_lowercase(),
        s => s,
    };

    let input = ClassifyInput {
        isin: isin.as_str(),
        issuer_name: &name,
        issuer_type: patch.issuer_type.as_deref(),
        ownership_label: patch.ownership_label.as_deref(),
        bond_type_label: patch.bond_type_label.as_deref(),
        description: patch.description.as_deref(),
        tax_free: patch.tax_free,
    };
    let ownership = classifier.ownership(&input);
    let bond_type = classifier.bond_type(&input, ownership);

    let normalized_rating = patch
        .credit_rating
        .as_deref()
        .and_then(normalize_rating)
        .unwrap_or(Grade::Unrated);
    let coupon_type = patch.coupon_type.unwrap_or(match patch.coupon_rate {
        Some(rate) if rate == 0.0 => CouponType::Zero,
        _ => CouponType::Fixed,
    });

    CanonicalBond {
        issuer: Issuer {
            id: slug,
            name,
            sector: patch.sector,
            ownership,
            issuer_type: patch.issuer_type,
            latest_rating: patch.credit_rating.clone(),
        },
        description: patch.description,
        coupon_rate: patch.coupon_rate,
        coupon_type,
        coupon_frequency: patch.coupon_frequency,
        maturity_date: patch.maturity_date,
        issue_date: patch.issue_date,
        face_value: patch.face_value,
        issue_size: patch.issue_size,
        min_investment: patch.min_investment,
        credit_rating: patch.credit_rating,
        rating_agency: patch.rating_agency,
        rating_date: patch.rating_date,
        rating_rank: normalized_rating.rank(),
        normalized_rating,
        is_active: CanonicalBond::active_on(patch.maturity_date, synced_at.date_naive()),
        is_restructured: patch.is_restructured.unwrap_or(false),
        bond_type,
        provenance: Provenance {
            primary_source: SourceEndpoint::ActiveSecurities,
            sources,
            last_synced_at: synced_at,
        },
        isin,
    }
}
