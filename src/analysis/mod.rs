//! Scoring and ranking.
//!
//! Weighted composite scores, tier classification and the aggregator
//! that orders opportunities for the brief.

pub mod aggregator;
pub mod weights;

pub use aggregator::*;
pub use weights::*;
