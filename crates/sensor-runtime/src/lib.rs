//! Runtime layer of the intake pipeline.
//!
//! Routes individual files through validation, quarantine, storage and
//! archiving, and drives the polling loop that feeds them in.

pub mod dead_letter;
pub mod intake;
pub mod router;

pub use intake::{CycleReport, IntakeHandle, IntakeLoop};
pub use router::FileRouter;

pub use sensor_core as core;
pub use sensor_data as data;
