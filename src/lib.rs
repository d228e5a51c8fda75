//! skilltag - Proficiency-level tagging of course skills against a
//! sector taxonomy.
//!
//! ## Architecture
//!
//! skilltag runs two tagging passes over (course, skill) pairs:
//! - **Tagger Pool**: First pass, using the skill's own proficiency level
//!   definitions and the course description
//! - **Rescue Pool**: Second pass over unresolved pairs, using the skill's
//!   knowledge base plus a generic proficiency reference chart
//!
//! Around the passes sit concurrent upload validation, skill-title
//! normalization, a bucket storage layer (local or S3), and batch-level
//! checkpointing for resumable runs.

pub mod app;
pub mod checkpoint;
pub mod client;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod preprocess;
pub mod storage;
pub mod validation;

// Re-exports for convenience
pub use app::{App, RunContext, UploadReceipt};
pub use checkpoint::{CheckpointManager, CheckpointState, RunPhase};
pub use client::{Infer, InferenceClient, RateLimiter};
pub use models::{
    Config, Dataset, ProficiencyTag, Result, RunStats, SchemaKind, SkilltagError, ValidationReport,
};
pub use pipeline::{RunArtifacts, TaggingEngine};
pub use pool::{RescuePool, TaggerPool};
pub use storage::{Bucket, BucketStore};
