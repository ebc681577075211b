//! Pipeline module - feature aggregation, encoding, scoring and the batch runner

pub mod columns;
pub mod encoding;
pub mod features;
pub mod filters;
pub mod format;
pub mod join;
pub mod runner;
pub mod scoring;
pub mod sources;

pub use encoding::*;
pub use filters::*;
pub use format::*;
pub use join::{FeatureTable, FeatureValues};
pub use runner::*;
pub use sources::*;
