use crate::record::LogRecord;
use crate::sink::{LogSink, SinkError};
use async_trait::async_trait;

/// A sink that simply drops all batches.
///
/// Useful for measuring the overhead of the remote logger itself without any
/// network I/O.
#[derive(Clone, Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn send_batch(&self, _records: &[LogRecord]) -> Result<(), SinkError> {
        Ok(())
    }
}
