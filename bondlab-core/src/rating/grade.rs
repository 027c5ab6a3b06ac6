//! Canonical credit grades and their rank.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// One canonical credit grade.
///
/// The long-term ladder runs `AAA` (best) to `D` (default). `PpMld`,
/// `Withdrawn` and `Unrated` are sentinels ranked below every ladder grade.
/// `Unrecognized` carries a cleaned string the normalizer could not place;
/// it ranks with `Unrated`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Grade {
    Aaa,
    AaPlus,
    Aa,
    AaMinus,
    APlus,
    A,
    AMinus,
    BbbPlus,
    Bbb,
    BbbMinus,
    BbPlus,
    Bb,
    BbMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    D,
    PpMld,
    Withdrawn,
    Unrated,
    Unrecognized(String),
}

/// The ladder, best first.
pub const LADDER: [Grade; 20] = [
    Grade::Aaa,
    Grade::AaPlus,
    Grade::Aa,
    Grade::AaMinus,
    Grade::APlus,
    Grade::A,
    Grade::AMinus,
    Grade::BbbPlus,
    Grade::Bbb,
    Grade::BbbMinus,
    Grade::BbPlus,
    Grade::Bb,
    Grade::BbMinus,
    Grade::BPlus,
    Grade::B,
    Grade::BMinus,
    Grade::CPlus,
    Grade::C,
    Grade::CMinus,
    Grade::D,
];

/// Worst defined rank; unmapped grades land here.
pub const WORST_RANK: u32 = 23;

impl Grade {
    /// Numeric rank: lower is better credit quality.
    pub fn rank(&self) -> u32 {
        match self {
            Grade::Aaa => 1,
            Grade::AaPlus => 2,
            Grade::Aa => 3,
            Grade::AaMinus => 4,
            Grade::APlus => 5,
            Grade::A => 6,
            Grade::AMinus => 7,
            Grade::BbbPlus => 8,
            Grade::Bbb => 9,
            Grade::BbbMinus => 10,
            Grade::BbPlus => 11,
            Grade::Bb => 12,
            Grade::BbMinus => 13,
            Grade::BPlus => 14,
            Grade::B => 15,
            Grade::BMinus => 16,
            Grade::CPlus => 17,
            Grade::C => 18,
            Grade::CMinus => 19,
            Grade::D => 20,
            Grade::PpMld => 21,
            Grade::Withdrawn => 22,
            Grade::Unrated | Grade::Unrecognized(_) => WORST_RANK,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Grade::Aaa => "AAA",
            Grade::AaPlus => "AA+",
            Grade::Aa => "AA",
            Grade::AaMinus => "AA-",
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BbbPlus => "BBB+",
            Grade::Bbb => "BBB",
            Grade::BbbMinus => "BBB-",
            Grade::BbPlus => "BB+",
            Grade::Bb => "BB",
            Grade::BbMinus => "BB-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::D => "D",
            Grade::PpMld => "PP-MLD",
            Grade::Withdrawn => "WITHDRAWN",
            Grade::Unrated => "Unrated",
            Grade::Unrecognized(s) => s,
        }
    }

    /// Whether this is a ladder grade (not a sentinel, not unrecognized).
    pub fn is_ladder(&self) -> bool {
        self.rank() <= Grade::D.rank()
    }

    /// Exact lookup of a canonical ladder spelling (uppercase, no spaces).
    pub fn from_ladder_str(s: &str) -> Option<Grade> {
        LADDER.iter().find(|g| g.as_str() == s).cloned()
    }

    /// Exact lookup of every canonical spelling, sentinels included.
    fn from_canonical(s: &str) -> Option<Grade> {
        Self::from_ladder_str(s).or_else(|| match s {
            "PP-MLD" => Some(Grade::PpMld),
            "WITHDRAWN" => Some(Grade::Withdrawn),
            "Unrated" => Some(Grade::Unrated),
            _ => None,
        })
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = std::convert::Infallible;

    /// Canonical spellings map to their variant; anything else is normalized.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(g) = Grade::from_canonical(s) {
            return Ok(g);
        }
        Ok(super::normalize_rating(s).unwrap_or(Grade::Unrated))
    }
}

impl PartialOrd for Grade {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Better grades sort first; ties among unmapped grades break on spelling.
impl Ord for Grade {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.as_str().cmp(other.as_str()))
    }
}

impl Serialize for Grade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Grade {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Grade::from_canonical(&s).unwrap_or(Grade::Unrecognized(s)))
    }
}
