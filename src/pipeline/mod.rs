//! Tagging pipeline: prompts and the two-phase engine.

mod engine;
pub mod prompts;

pub use engine::{build_skill_index, extract_pairs, RunArtifacts, TaggingEngine};
