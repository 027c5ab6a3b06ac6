pub mod bond;
pub mod endpoint;
pub mod ids;
pub mod record;

pub use bond::{
    sort_best_rated_first, BondType, CanonicalBond, CouponFrequency, CouponType, Issuer,
    Ownership, Provenance,
};
pub use endpoint::SourceEndpoint;
pub use ids::{Isin, ValidationError};
pub use record::{RawRecord, TaggedRecord};
