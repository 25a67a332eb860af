use crate::record::LogRecord;
use async_trait::async_trait;
use std::error::Error;

/// Error type returned by [`LogSink`] implementations.
pub type SinkError = Box<dyn Error + Send + Sync>;

/// Asynchronous destination for batches of [`LogRecord`]s.
///
/// Implementations transport records to a concrete backend (an HTTP
/// collector, ClickHouse, etc). [`RemoteLogger`](crate::remote::RemoteLogger)
/// calls `send_batch` from its background task and never awaits it on the
/// application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Send one batch of records to the underlying backend.
    ///
    /// **Returns**
    /// - `Ok(())` if the whole batch was accepted.
    /// - `Err(..)` on network, serialization or HTTP status failures. The
    ///   caller treats this as transient and retries the same batch.
    async fn send_batch(&self, records: &[LogRecord]) -> Result<(), SinkError>;

    /// Flush any buffered records, if the backend buffers. Default is a no-op.
    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
