//! Core data models for skilltag.

mod config;
mod dataset;
mod error;
mod pair;
mod tag;

pub use config::*;
pub use dataset::*;
pub use error::*;
pub use pair::*;
pub use tag::*;
