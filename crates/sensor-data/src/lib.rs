//! Reading, validating, summarising and quarantining intake files.

pub mod aggregator;
pub mod naming;
pub mod quarantine;
pub mod reader;
pub mod validator;

pub use aggregator::MetricAggregator;
pub use validator::{validate, Validation};

// Re-export core types for convenience.
pub use sensor_core as core;
