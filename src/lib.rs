//! PDO: Probability of Default batch scoring
//!
//! Aggregates per-source client data onto a main entity table, encodes it into
//! the model's categorical buckets and scores every entity with a calibrated
//! logistic model.

pub mod cli;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod utils;

pub use error::{PdoError, PdoResult};
