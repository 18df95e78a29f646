use sensor_core::error::SinkError;
use sensor_core::models::{AggregateRow, ValidatedRecord};

/// Append-only destination for one file's valid rows and aggregates.
///
/// Implementations are shared across worker threads behind an `Arc`.
pub trait Sink: Send + Sync {
    /// Persist raw readings; returns the number of rows written.
    fn append_raw(&self, records: &[ValidatedRecord]) -> Result<usize, SinkError>;

    /// Persist aggregate rows; returns the number of rows written.
    fn append_aggregates(&self, rows: &[AggregateRow]) -> Result<usize, SinkError>;

    /// Persist everything derived from one intake file.
    ///
    /// The default writes raw rows first and aggregates second as two
    /// independent appends.
    fn append_file(
        &self,
        records: &[ValidatedRecord],
        aggregates: &[AggregateRow],
    ) -> Result<(), SinkError> {
        self.append_raw(records)?;
        self.append_aggregates(aggregates)?;
        Ok(())
    }

    /// Short backend name for logging.
    fn backend_type(&self) -> &'static str;
}
