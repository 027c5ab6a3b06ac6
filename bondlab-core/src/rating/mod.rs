//! Rating grade normalization and ranking.

pub mod grade;
pub mod normalize;

pub use grade::{Grade, LADDER, WORST_RANK};
pub use normalize::{compare_ratings, normalize_rating, rank_of_rating};
