//! Concurrent tagging pools.

mod rescue;
mod tagger;

pub use rescue::RescuePool;
pub use tagger::TaggerPool;
