//! Shared types for the sensor-reading intake pipeline.
//!
//! Holds the record model, the error taxonomy, summary statistics and the
//! command-line / file configuration that every other crate consumes.

pub mod error;
pub mod models;
pub mod settings;
pub mod stats;

pub use error::{FailureKind, PipelineError, Result, SinkError, StructuralError};
pub use settings::{PipelineConfig, Settings, WriteMode};
