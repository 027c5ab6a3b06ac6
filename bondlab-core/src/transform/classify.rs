//! Ownership and bond-type inference.
//!
//! Keyword heuristics over the issuer name and whatever type labels the
//! upstream supplied. Best-effort: a name that happens to contain a keyword
//! ("National" in a private lender's name) is misclassified. Unknown input
//! falls back to [`Ownership::Unknown`] and [`BondType::Corporate`].

use crate::domain::{BondType, Ownership};

/// What the classifier gets to look at.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyInput<'a> {
    pub isin: &'a str,
    pub issuer_name: &'a str,
    pub issuer_type: Option<&'a str>,
    pub ownership_label: Option<&'a str>,
    pub bond_type_label: Option<&'a str>,
    pub description: Option<&'a str>,
    pub tax_free: Option<bool>,
}

pub trait IssuerClassifier: Send + Sync {
    fn ownership(&self, input: &ClassifyInput<'_>) -> Ownership;

    /// `ownership` is the result of [`ownership`](Self::ownership) for the
    /// same input.
    fn bond_type(&self, input: &ClassifyInput<'_>, ownership: Ownership) -> BondType;
}

/// Table-driven [`IssuerClassifier`].
///
/// Rules are `(keyword, value)` pairs matched on whole words of the
/// uppercased text; earlier rules win. Explicit labels are consulted before
/// the issuer name.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    ownership_labels: Vec<(String, Ownership)>,
    ownership_names: Vec<(String, Ownership)>,
    bond_type_rules: Vec<(String, BondType)>,
}

const OWNERSHIP_LABELS: [(&str, Ownership); 8] = [
    ("PSU", Ownership::Psu),
    ("PUBLIC SECTOR", Ownership::Psu),
    ("CENTRAL GOVERNMENT", Ownership::Government),
    ("STATE GOVERNMENT", Ownership::Government),
    ("GOVERNMENT", Ownership::Government),
    ("PRIVATE", Ownership::Private),
    ("PRIVATE SECTOR", Ownership::Private),
    ("CORPORATE", Ownership::Private),
];

const OWNERSHIP_NAMES: [(&str, Ownership); 16] = [
    ("GOVERNMENT OF INDIA", Ownership::Government),
    ("GOVT OF INDIA", Ownership::Government),
    ("GOI", Ownership::Government),
    ("STATE OF", Ownership::Government),
    ("STATE DEVELOPMENT LOAN", Ownership::Government),
    ("NATIONAL HIGHWAYS AUTHORITY", Ownership::Psu),
    ("INDIAN RAILWAY", Ownership::Psu),
    ("POWER FINANCE CORP", Ownership::Psu),
    ("REC", Ownership::Psu),
    ("NTPC", Ownership::Psu),
    ("NABARD", Ownership::Psu),
    ("SIDBI", Ownership::Psu),
    ("HUDCO", Ownership::Psu),
    ("BHARAT", Ownership::Psu),
    ("PVT", Ownership::Private),
    ("LLP", Ownership::Private),
];

const BOND_TYPE_RULES: [(&str, BondType); 10] = [
    ("TAX FREE", BondType::TaxFree),
    ("TAXFREE", BondType::TaxFree),
    ("SDL", BondType::Sdl),
    ("STATE DEVELOPMENT LOAN", BondType::Sdl),
    ("G SEC", BondType::Gsec),
    ("GSEC", BondType::Gsec),
    ("GOVERNMENT SECURITY", BondType::Gsec),
    ("TREASURY BILL", BondType::Gsec),
    ("PSU", BondType::Psu),
    ("CORPORATE", BondType::Corporate),
];

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            ownership_labels: rules(&OWNERSHIP_LABELS),
            ownership_names: rules(&OWNERSHIP_NAMES),
            bond_type_rules: rules(&BOND_TYPE_RULES),
        }
    }
}

fn rules<T: Copy>(table: &[(&str, T)]) -> Vec<(String, T)> {
    table.iter().map(|(k, v)| (words(k), *v)).collect()
}

impl KeywordClassifier {
    /// Add a name keyword ahead of the built-in ones.
    pub fn with_ownership_rule(mut self, keyword: &str, ownership: Ownership) -> Self {
        self.ownership_names.insert(0, (words(keyword), ownership));
        self
    }

    /// Add a bond-type keyword ahead of the built-in ones.
    pub fn with_bond_type_rule(mut self, keyword: &str, bond_type: BondType) -> Self {
        self.bond_type_rules.insert(0, (words(keyword), bond_type));
        self
    }
}

impl IssuerClassifier for KeywordClassifier {
    fn ownership(&self, input: &ClassifyInput<'_>) -> Ownership {
        let labels = [input.ownership_label, input.issuer_type];
        for label in labels.into_iter().flatten() {
            if let Some(o) = first_match(&self.ownership_labels, label) {
                return o;
            }
        }
        first_match(&self.ownership_names, input.issuer_name).unwrap_or_default()
    }

    fn bond_type(&self, input: &ClassifyInput<'_>, ownership: Ownership) -> BondType {
        if let Some(t) = input
            .bond_type_label
            .and_then(|label| first_match(&self.bond_type_rules, label))
        {
            return t;
        }
        if input.tax_free == Some(true) {
            return BondType::TaxFree;
        }
        let texts = [input.description, Some(input.issuer_name)];
        for text in texts.into_iter().flatten() {
            if let Some(t) = first_match(&self.bond_type_rules, text) {
                // "PSU"/"CORPORATE" in free text is too weak to override
                // what ownership says.
                if matches!(t, BondType::TaxFree | BondType::Sdl | BondType::Gsec) {
                    return t;
                }
            }
        }
        if let Some(t) = from_isin(input.isin) {
            return t;
        }
        match ownership {
            Ownership::Psu => BondType::Psu,
            Ownership::Government => BondType::Gsec,
            Ownership::Private | Ownership::Unknown => BondType::Corporate,
        }
    }
}

/// Indian sovereign ISINs: `IN00…` for central government securities, `IN`
/// followed by another digit for state development loans. Corporate ISINs
/// start with a letter after `IN` (`INE…`).
fn from_isin(isin: &str) -> Option<BondType> {
    let b = isin.as_bytes();
    if b.len() < 4 || &b[..2] != b"IN" || !b[2].is_ascii_digit() {
        return None;
    }
    if b[2] == b'0' && b[3] == b'0' {
        Some(BondType::Gsec)
    } else {
        Some(BondType::Sdl)
    }
}

/// Uppercase words joined by single spaces, padded with one space each side
/// so whole-word matching is a substring check.
fn words(text: &str) -> String {
    let joined = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join(" ");
    format!(" {joined} ")
}

fn first_match<T: Copy>(rules: &[(String, T)], text: &str) -> Option<T> {
    let haystack = words(text);
    rules
        .iter()
        .find(|(needle, _)| !needle.trim().is_empty() && haystack.contains(needle.as_str()))
        .map(|(_, v)| *v)
}
