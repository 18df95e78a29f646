//! Durable storage for validated readings and their summaries.

pub mod sink;
pub mod sqlite;

pub use sink::Sink;
pub use sqlite::SqliteSink;
