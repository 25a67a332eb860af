use crate::adapter::{BaseFields, Entry};
use crate::context::Context;
use crate::field::Field;
use crate::level::Level;
use crate::logger::{Logger, RequestInfo};
use crate::record::LogRecord;
use crate::sink::LogSink;
use crate::terminate::{ProcessExit, Terminator, FATAL_EXIT_CODE};
use crate::trace_id::TraceIdResolver;
use parking_lot::Mutex;
use std::error::Error;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Configuration of a [`RemoteLogger`].
///
/// **Fields**
/// - `batch_size`: records per request; reaching it wakes the flush task.
/// - `flush_interval`: maximum time between flushes of a partial batch.
/// - `max_retries`: retries after a failed send. The wait before retry
///   *n* is `retry_backoff * n`.
/// - `max_buffer`: records held while the sink is slow; new records are
///   dropped beyond it.
/// - `fatal_flush_timeout`: upper bound on the flush a fatal call does
///   before terminating.
/// - `level`, `enable_caller`: as for the default backend.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub max_buffer: usize,
    pub fatal_flush_timeout: Duration,
    pub level: Level,
    pub enable_caller: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            max_buffer: 10_000,
            fatal_flush_timeout: Duration::from_secs(5),
            level: Level::Info,
            enable_caller: true,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("remote logger must be started from within a tokio runtime")]
    NoRuntime,
}

struct Shared {
    buffer: Mutex<Vec<LogRecord>>,
    notify: Notify,
    sink: Arc<dyn LogSink>,
    config: RemoteConfig,
    // Serializes the background task with shutdown and fatal flushes.
    flushing: tokio::sync::Mutex<()>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn push(&self, record: LogRecord) {
        let len = {
            let mut buffer = self.buffer.lock();
            if buffer.len() >= self.config.max_buffer {
                drop(buffer);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                eprintln!("remote log buffer full, dropping log record");
                return;
            }
            buffer.push(record);
            buffer.len()
        };
        if len >= self.config.batch_size {
            self.notify.notify_one();
        }
    }

    async fn flush(&self) {
        let _guard = self.flushing.lock().await;
        let pending = std::mem::take(&mut *self.buffer.lock());
        for batch in pending.chunks(self.config.batch_size) {
            self.send_with_retry(batch).await;
        }
    }

    async fn send_with_retry(&self, batch: &[LogRecord]) {
        let mut attempt: u32 = 0;
        loop {
            match self.sink.send_batch(batch).await {
                Ok(()) => {
                    self.sent.fetch_add(batch.len() as u64, Ordering::Relaxed);
                    return;
                }
                Err(e) if attempt >= self.config.max_retries => {
                    self.dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
                    eprintln!(
                        "remote log sink failed after {} attempts, dropping {} records: {}",
                        attempt + 1,
                        batch.len(),
                        e
                    );
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    let wait = self.config.retry_backoff * attempt;
                    tracing::debug!(attempt, ?wait, error = %e, "remote log send failed, retrying");
                    sleep(wait).await;
                }
            }
        }
    }
}

async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = shared.notify.notified() => {}
        }
        shared.flush().await;
    }
    shared.flush().await;
}

/// [`Logger`] that batches records and ships them to a [`LogSink`] from a
/// background tokio task.
///
/// Logging calls only append to an in-memory buffer. The task flushes it
/// every `flush_interval`, or as soon as `batch_size` records are waiting.
/// Failed sends are retried with linear backoff; when retries run out the
/// batch is dropped and reported on stderr.
///
/// Call [`shutdown`](Self::shutdown) before the process exits to deliver
/// what is still buffered.
pub struct RemoteLogger {
    shared: Arc<Shared>,
    base: BaseFields,
    trace_ids: Arc<TraceIdResolver>,
    terminator: Arc<dyn Terminator>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
}

impl RemoteLogger {
    /// Spawn the flush task on the current tokio runtime.
    ///
    /// **Returns**
    /// - `Err(RemoteError::NoRuntime)` if called outside a runtime.
    pub fn start(
        sink: Arc<dyn LogSink>,
        base: BaseFields,
        trace_ids: Arc<TraceIdResolver>,
        config: RemoteConfig,
    ) -> Result<Self, RemoteError> {
        let runtime = Handle::try_current().map_err(|_| RemoteError::NoRuntime)?;

        // Enforce minimal thresholds to avoid degenerate configs.
        let mut config = config;
        config.batch_size = config.batch_size.max(1);
        config.max_buffer = config.max_buffer.max(config.batch_size);
        config.flush_interval = config.flush_interval.max(Duration::from_millis(10));

        let shared = Arc::new(Shared {
            buffer: Mutex::new(Vec::with_capacity(config.batch_size)),
            notify: Notify::new(),
            sink,
            config,
            flushing: tokio::sync::Mutex::new(()),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        let cancel = CancellationToken::new();
        let task = runtime.spawn(run(Arc::clone(&shared), cancel.clone()));

        Ok(RemoteLogger {
            shared,
            base,
            trace_ids,
            terminator: Arc::new(ProcessExit),
            cancel,
            task: Mutex::new(Some(task)),
            runtime,
        })
    }

    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    /// Records delivered to the sink so far.
    pub fn sent_records(&self) -> u64 {
        self.shared.sent.load(Ordering::Relaxed)
    }

    /// Records given up on: buffer overflow or retries exhausted.
    pub fn dropped_records(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Records waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.shared.buffer.lock().len()
    }

    /// Flush now, without waiting for the timer.
    pub async fn flush(&self) {
        self.shared.flush().await;
    }

    /// Stop the flush task, wait for its current cycle, then deliver
    /// everything still buffered. Records logged afterwards stay buffered
    /// until the next [`flush`](Self::flush).
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                eprintln!("remote log flush task failed: {}", e);
            }
        }
        self.shared.flush().await;
        if let Err(e) = self.shared.sink.flush().await {
            eprintln!("remote log sink flush failed: {}", e);
        }
    }

    fn enabled(&self, level: Level) -> bool {
        level >= self.shared.config.level
    }

    #[track_caller]
    fn emit(&self, level: Level, entry: Entry<'_>) {
        let caller = if self.shared.config.enable_caller { Some(Location::caller()) } else { None };
        let record = entry.caller(caller).into_record(level, &self.base, &self.trace_ids);
        self.shared.push(record);
    }

    // Runs on a helper thread since the caller may be a runtime thread.
    // A current-thread runtime cannot drive timers or I/O while its only
    // thread is blocked here, so the flush gets a runtime of its own.
    fn flush_blocking(&self) {
        let shared = &self.shared;
        let limit = shared.config.fatal_flush_timeout;
        let bounded = async move { timeout(limit, shared.flush()).await };
        let runtime = &self.runtime;

        std::thread::scope(|s| {
            s.spawn(move || {
                let outcome = match runtime.runtime_flavor() {
                    RuntimeFlavor::CurrentThread => match Builder::new_current_thread().enable_all().build() {
                        Ok(local) => local.block_on(bounded),
                        Err(e) => {
                            eprintln!("failed to start runtime for fatal log flush: {}", e);
                            return;
                        }
                    },
                    _ => runtime.block_on(bounded),
                };
                if outcome.is_err() {
                    eprintln!("remote log flush did not finish within {:?}, exiting anyway", limit);
                }
            });
        });
    }
}

impl Drop for RemoteLogger {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Logger for RemoteLogger {
    #[track_caller]
    fn debug(&self, ctx: &Context, module: &str, message: &str, fields: &[Field]) {
        if !self.enabled(Level::Debug) {
            return;
        }
        self.emit(Level::Debug, Entry::new(ctx, module, message, fields));
    }

    #[track_caller]
    fn info(&self, ctx: &Context, module: &str, message: &str, fields: &[Field]) {
        if !self.enabled(Level::Info) {
            return;
        }
        self.emit(Level::Info, Entry::new(ctx, module, message, fields));
    }

    #[track_caller]
    fn warn(&self, ctx: &Context, module: &str, message: &str, fields: &[Field]) {
        if !self.enabled(Level::Warn) {
            return;
        }
        self.emit(Level::Warn, Entry::new(ctx, module, message, fields));
    }

    #[track_caller]
    fn error(&self, ctx: &Context, module: &str, message: &str, err: Option<&dyn Error>, fields: &[Field]) {
        if !self.enabled(Level::Error) {
            return;
        }
        self.emit(Level::Error, Entry::new(ctx, module, message, fields).err(err));
    }

    #[track_caller]
    fn error_with_code(
        &self,
        ctx: &Context,
        module: &str,
        message: &str,
        error_code: &str,
        err: Option<&dyn Error>,
        fields: &[Field],
    ) {
        if !self.enabled(Level::Error) {
            return;
        }
        self.emit(Level::Error, Entry::new(ctx, module, message, fields).err(err).code(error_code));
    }

    #[track_caller]
    fn fatal(&self, ctx: &Context, module: &str, message: &str, err: Option<&dyn Error>, fields: &[Field]) {
        self.emit(Level::Fatal, Entry::new(ctx, module, message, fields).err(err));
        self.flush_blocking();
        self.terminator.terminate(FATAL_EXIT_CODE);
    }

    #[track_caller]
    fn info_with_request(&self, ctx: &Context, module: &str, message: &str, request: RequestInfo<'_>, fields: &[Field]) {
        if !self.enabled(Level::Info) {
            return;
        }
        self.emit(Level::Info, Entry::new(ctx, module, message, fields).request(request));
    }

    #[track_caller]
    fn error_with_request(
        &self,
        ctx: &Context,
        module: &str,
        message: &str,
        request: RequestInfo<'_>,
        err: Option<&dyn Error>,
        fields: &[Field],
    ) {
        if !self.enabled(Level::Error) {
            return;
        }
        self.emit(Level::Error, Entry::new(ctx, module, message, fields).err(err).request(request));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Fails the first `failures` calls, then records every batch.
    #[derive(Default)]
    struct FlakySink {
        failures: usize,
        calls: AtomicUsize,
        batches: Mutex<Vec<Vec<LogRecord>>>,
    }

    impl FlakySink {
        fn failing(failures: usize) -> Arc<Self> {
            Arc::new(FlakySink { failures, ..Default::default() })
        }

        fn records(&self) -> Vec<LogRecord> {
            self.batches.lock().iter().flatten().cloned().collect()
        }
    }

    #[async_trait]
    impl LogSink for FlakySink {
        async fn send_batch(&self, records: &[LogRecord]) -> Result<(), SinkError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err("collector unavailable".into());
            }
            self.batches.lock().push(records.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTerminator {
        codes: Mutex<Vec<i32>>,
    }

    impl Terminator for RecordingTerminator {
        fn terminate(&self, code: i32) {
            self.codes.lock().push(code);
        }
    }

    fn quiet_config() -> RemoteConfig {
        RemoteConfig {
            batch_size: 100,
            flush_interval: Duration::from_secs(3600),
            max_retries: 3,
            retry_backoff: Duration::from_millis(5),
            level: Level::Debug,
            ..RemoteConfig::default()
        }
    }

    fn start(sink: Arc<FlakySink>, config: RemoteConfig) -> RemoteLogger {
        RemoteLogger::start(sink, BaseFields::new("svc", "test"), Arc::new(TraceIdResolver::new()), config).unwrap()
    }

    async fn wait_for_records(sink: &FlakySink, n: usize) {
        for _ in 0..500 {
            if sink.records().len() >= n {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("sink received {} records, expected {}", sink.records().len(), n);
    }

    #[test]
    fn start_requires_runtime() {
        let result = RemoteLogger::start(
            Arc::new(FlakySink::default()),
            BaseFields::default(),
            Arc::new(TraceIdResolver::new()),
            RemoteConfig::default(),
        );
        assert!(matches!(result, Err(RemoteError::NoRuntime)));
    }

    #[tokio::test]
    async fn full_batch_wakes_flush_task() {
        let sink = FlakySink::failing(0);
        let logger = start(Arc::clone(&sink), RemoteConfig { batch_size: 2, ..quiet_config() });
        let ctx = Context::background();

        logger.info(&ctx, "api", "one", &[]);
        logger.info(&ctx, "api", "two", &[Field::int("n", 2)]);
        wait_for_records(&sink, 2).await;

        let records = sink.records();
        assert_eq!(records[0].message, "one");
        assert_eq!(records[1].field("n"), Some(&serde_json::json!(2)));
        assert_eq!(records[1].str_field("service"), Some("svc"));
        logger.shutdown().await;
    }

    #[tokio::test]
    async fn interval_flushes_partial_batch() {
        let sink = FlakySink::failing(0);
        let logger = start(
            Arc::clone(&sink),
            RemoteConfig { flush_interval: Duration::from_millis(20), ..quiet_config() },
        );
        logger.warn(&Context::background(), "cache", "slow", &[]);
        wait_for_records(&sink, 1).await;
        assert_eq!(logger.buffered(), 0);
        logger.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_buffer() {
        let sink = FlakySink::failing(0);
        let logger = start(Arc::clone(&sink), quiet_config());
        let ctx = Context::background();
        for i in 0..3 {
            logger.info(&ctx, "job", &format!("step {i}"), &[]);
        }
        assert_eq!(logger.buffered(), 3);

        logger.shutdown().await;
        assert_eq!(sink.records().len(), 3);
        assert_eq!(logger.buffered(), 0);
        assert_eq!(logger.sent_records(), 3);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let sink = FlakySink::failing(2);
        let logger = start(Arc::clone(&sink), quiet_config());
        logger.error(&Context::background(), "db", "lost connection", None, &[]);

        logger.shutdown().await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.records().len(), 1);
        assert_eq!(logger.dropped_records(), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_drop_batch() {
        let sink = FlakySink::failing(usize::MAX);
        let logger = start(Arc::clone(&sink), RemoteConfig { max_retries: 2, ..quiet_config() });
        logger.info(&Context::background(), "db", "a", &[]);
        logger.info(&Context::background(), "db", "b", &[]);

        logger.shutdown().await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(logger.dropped_records(), 2);
        assert_eq!(logger.sent_records(), 0);
    }

    #[tokio::test]
    async fn level_threshold_applies() {
        let sink = FlakySink::failing(0);
        let logger = start(Arc::clone(&sink), RemoteConfig { level: Level::Warn, ..quiet_config() });
        let ctx = Context::background();
        logger.debug(&ctx, "m", "no", &[]);
        logger.info_with_request(&ctx, "m", "no", RequestInfo::new("r", 5), &[]);
        logger.error_with_request(&ctx, "m", "yes", RequestInfo::new("r-1", 12), None, &[]);

        logger.shutdown().await;
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].str_field("request_id"), Some("r-1"));
        assert_eq!(records[0].field("cost_ms"), Some(&serde_json::json!(12)));
    }

    #[tokio::test]
    async fn buffer_overflow_drops_new_records() {
        let sink = FlakySink::failing(0);
        let logger = start(Arc::clone(&sink), RemoteConfig { batch_size: 2, max_buffer: 2, ..quiet_config() });
        // Hold the flush lock so the task cannot drain while we overfill.
        let guard = logger.shared.flushing.lock().await;
        let ctx = Context::background();
        for _ in 0..5 {
            logger.info(&ctx, "m", "x", &[]);
        }
        assert_eq!(logger.buffered(), 2);
        assert_eq!(logger.dropped_records(), 3);
        drop(guard);
        logger.shutdown().await;
        assert_eq!(sink.records().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fatal_flushes_before_terminating() {
        let sink = FlakySink::failing(0);
        let terminator = Arc::new(RecordingTerminator::default());
        let logger = start(Arc::clone(&sink), quiet_config()).with_terminator(terminator.clone());
        let ctx = Context::background();

        logger.info(&ctx, "boot", "starting", &[]);
        logger.fatal(&ctx, "boot", "cannot bind", None, &[Field::string("addr", "0.0.0.0:80")]);

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].level, Level::Fatal);
        assert_eq!(records[1].str_field("addr"), Some("0.0.0.0:80"));
        assert_eq!(*terminator.codes.lock(), vec![FATAL_EXIT_CODE]);
        logger.shutdown().await;
    }

    #[tokio::test]
    async fn fatal_on_current_thread_runtime_retries_and_terminates() {
        let sink = FlakySink::failing(1);
        let terminator = Arc::new(RecordingTerminator::default());
        let logger = start(Arc::clone(&sink), quiet_config()).with_terminator(terminator.clone());

        logger.fatal(&Context::background(), "boot", "cannot bind", None, &[]);

        assert_eq!(*terminator.codes.lock(), vec![FATAL_EXIT_CODE]);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.records()[0].level, Level::Fatal);
        logger.shutdown().await;
    }

    #[tokio::test]
    async fn stalled_fatal_flush_still_terminates() {
        let sink = FlakySink::failing(0);
        let terminator = Arc::new(RecordingTerminator::default());
        let logger = start(
            Arc::clone(&sink),
            RemoteConfig { fatal_flush_timeout: Duration::from_millis(50), ..quiet_config() },
        )
        .with_terminator(terminator.clone());

        // A flush already in progress elsewhere holds the lock.
        let guard = logger.shared.flushing.lock().await;
        logger.fatal(&Context::background(), "boot", "cannot bind", None, &[]);
        assert_eq!(*terminator.codes.lock(), vec![FATAL_EXIT_CODE]);
        assert!(sink.records().is_empty());
        assert_eq!(logger.buffered(), 1);

        drop(guard);
        logger.shutdown().await;
        assert_eq!(sink.records().len(), 1);
    }
}
