//! Report module - run metrics, summary and JSON report

pub mod export;
pub mod metrics;
pub mod summary;

pub use export::*;
pub use metrics::*;
pub use summary::*;
