use crate::adapter::{BaseFields, JsonLogger};
use crate::config::{self, ConfigLoader, LogConfig};
use crate::context::Context;
use crate::field::Field;
use crate::init::{self, InitError};
use crate::logger::{Logger, RequestInfo};
use crate::trace_id::{TraceIdProvider, TraceIdResolver};
use crate::writer::{JsonWriter, RecordWriter};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use std::error::Error;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of the one-time configuration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InitState {
    /// No configuration applied yet.
    Unconfigured = 0,
    /// An initialization is running; concurrent callers wait on it.
    Configuring = 1,
    /// Configuration applied. Later initialization calls are no-ops.
    Ready = 2,
}

impl InitState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => InitState::Configuring,
            2 => InitState::Ready,
            _ => InitState::Unconfigured,
        }
    }
}

/// Registry resolving "the current logger" for every call site.
///
/// A facade owns the active [`Logger`] slot, the trace-id provider slot and
/// the one-time configuration latch. Applications usually go through the
/// process-wide instance ([`global`] and the crate-level functions), but a
/// facade can also be created and passed around explicitly.
///
/// Logging through a facade that has neither been initialized nor given a
/// logger still works: records go to a fallback JSON logger on stderr.
pub struct LogFacade {
    logger: RwLock<Option<Arc<dyn Logger>>>,
    trace_ids: Arc<TraceIdResolver>,
    config: OnceCell<Arc<LogConfig>>,
    state: AtomicU8,
    fallback: OnceCell<Arc<dyn Logger>>,
}

impl Default for LogFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl LogFacade {
    pub fn new() -> Self {
        LogFacade {
            logger: RwLock::new(None),
            trace_ids: Arc::new(TraceIdResolver::new()),
            config: OnceCell::new(),
            state: AtomicU8::new(InitState::Unconfigured as u8),
            fallback: OnceCell::new(),
        }
    }

    /// Replace the active logger. May be called at any time, any number of
    /// times, before or after initialization.
    pub fn set_logger(&self, logger: Arc<dyn Logger>) {
        *self.logger.write() = Some(logger);
        tracing::debug!("logger installed");
    }

    /// The logger registered via [`set_logger`](Self::set_logger) or
    /// initialization, if any.
    pub fn logger(&self) -> Option<Arc<dyn Logger>> {
        self.logger.read().clone()
    }

    /// The logger every entry point uses: the registered one, else the
    /// stderr fallback.
    pub fn active_logger(&self) -> Arc<dyn Logger> {
        if let Some(logger) = self.logger.read().as_ref() {
            return Arc::clone(logger);
        }
        Arc::clone(self.fallback.get_or_init(|| {
            let logger = JsonLogger::new(BaseFields::new("", ""), Arc::clone(&self.trace_ids))
                .with_writer(Arc::new(JsonWriter::stderr()));
            Arc::new(logger)
        }))
    }

    pub fn trace_ids(&self) -> &Arc<TraceIdResolver> {
        &self.trace_ids
    }

    pub fn register_provider(&self, provider: Arc<dyn TraceIdProvider>) {
        self.trace_ids.register(provider);
    }

    pub fn trace_id_provider(&self) -> Option<Arc<dyn TraceIdProvider>> {
        self.trace_ids.provider()
    }

    pub fn resolve_trace_id(&self, ctx: &Context) -> String {
        self.trace_ids.resolve_or_create(ctx)
    }

    /// Configuration applied by the first successful initialization.
    pub fn config(&self) -> Option<&LogConfig> {
        self.config.get().map(|c| c.as_ref())
    }

    pub fn state(&self) -> InitState {
        InitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Apply `config` once, writing to the rolling file and, if enabled,
    /// the console.
    ///
    /// **Returns**
    /// - `Ok(())` after the first successful call, and for every later call
    ///   regardless of its argument.
    /// - `Err(..)` when the level is invalid or the log directory cannot be
    ///   used. The facade stays unconfigured and a later call may retry.
    ///
    /// The configured default becomes the active logger, replacing one
    /// installed earlier with [`set_logger`](Self::set_logger). Call
    /// `set_logger` afterwards to route elsewhere.
    pub fn init(&self, config: LogConfig) -> Result<(), InitError> {
        self.init_with(config, init::default_writers)
    }

    /// Like [`init`](Self::init), but writes only to `writers`.
    pub fn init_with_writers(&self, config: LogConfig, writers: Vec<Arc<dyn RecordWriter>>) -> Result<(), InitError> {
        self.init_with(config, move |_| Ok(writers))
    }

    fn init_with<F>(&self, config: LogConfig, writers: F) -> Result<(), InitError>
    where
        F: FnOnce(&LogConfig) -> Result<Vec<Arc<dyn RecordWriter>>, InitError>,
    {
        self.config
            .get_or_try_init(|| {
                self.state.store(InitState::Configuring as u8, Ordering::Release);
                match self.configure(config, writers) {
                    Ok(config) => {
                        self.state.store(InitState::Ready as u8, Ordering::Release);
                        Ok(config)
                    }
                    Err(e) => {
                        self.state.store(InitState::Unconfigured as u8, Ordering::Release);
                        Err(e)
                    }
                }
            })
            .map(|_| ())
    }

    fn configure<F>(&self, config: LogConfig, writers: F) -> Result<Arc<LogConfig>, InitError>
    where
        F: FnOnce(&LogConfig) -> Result<Vec<Arc<dyn RecordWriter>>, InitError>,
    {
        // Validate before touching the file system.
        let level = config.parsed_level()?;
        let writers = writers(&config)?;
        let logger = init::build_logger(&config, writers, Arc::clone(&self.trace_ids))?;

        let replaced = self.logger.write().replace(Arc::new(logger)).is_some();
        if replaced {
            tracing::debug!("replaced previously registered logger with configured default");
        }

        tracing::info!(
            service = %config.service_name,
            env = %config.env,
            level = %level,
            dir = %config.dir.display(),
            "logger initialized"
        );
        Ok(Arc::new(config))
    }

    #[track_caller]
    pub fn debug(&self, ctx: &Context, module: &str, message: &str, fields: &[Field]) {
        self.active_logger().debug(ctx, module, message, fields);
    }

    #[track_caller]
    pub fn info(&self, ctx: &Context, module: &str, message: &str, fields: &[Field]) {
        self.active_logger().info(ctx, module, message, fields);
    }

    #[track_caller]
    pub fn warn(&self, ctx: &Context, module: &str, message: &str, fields: &[Field]) {
        self.active_logger().warn(ctx, module, message, fields);
    }

    #[track_caller]
    pub fn error(&self, ctx: &Context, module: &str, message: &str, err: Option<&dyn Error>, fields: &[Field]) {
        self.active_logger().error(ctx, module, message, err, fields);
    }

    #[track_caller]
    pub fn error_with_code(
        &self,
        ctx: &Context,
        module: &str,
        message: &str,
        error_code: &str,
        err: Option<&dyn Error>,
        fields: &[Field],
    ) {
        self.active_logger().error_with_code(ctx, module, message, error_code, err, fields);
    }

    #[track_caller]
    pub fn fatal(&self, ctx: &Context, module: &str, message: &str, err: Option<&dyn Error>, fields: &[Field]) {
        self.active_logger().fatal(ctx, module, message, err, fields);
    }

    #[track_caller]
    pub fn info_with_request(&self, ctx: &Context, module: &str, message: &str, request: RequestInfo<'_>, fields: &[Field]) {
        self.active_logger().info_with_request(ctx, module, message, request, fields);
    }

    #[track_caller]
    pub fn error_with_request(
        &self,
        ctx: &Context,
        module: &str,
        message: &str,
        request: RequestInfo<'_>,
        err: Option<&dyn Error>,
        fields: &[Field],
    ) {
        self.active_logger().error_with_request(ctx, module, message, request, err, fields);
    }
}

static GLOBAL: Lazy<Arc<LogFacade>> = Lazy::new(|| Arc::new(LogFacade::new()));

/// The process-wide facade behind the crate-level functions.
pub fn global() -> &'static Arc<LogFacade> {
    &GLOBAL
}

/// Initialize the process-wide facade. Only the first successful call has
/// an effect.
pub fn init_logger(config: LogConfig) -> Result<(), InitError> {
    global().init(config)
}

/// Load configuration from `dir` (see [`ConfigLoader`]) and initialize the
/// process-wide facade.
pub fn init_logger_from_dir(dir: impl AsRef<Path>) -> Result<(), InitError> {
    let config = ConfigLoader::new().with_config_dir(dir.as_ref()).load()?;
    init_logger(config)
}

/// Load configuration from a single YAML file and initialize the
/// process-wide facade.
pub fn init_logger_from_file(path: impl AsRef<Path>) -> Result<(), InitError> {
    let config = config::load_file(path.as_ref())?;
    init_logger(config)
}

pub fn set_logger(logger: Arc<dyn Logger>) {
    global().set_logger(logger);
}

pub fn get_logger() -> Option<Arc<dyn Logger>> {
    global().logger()
}

pub fn register_trace_id_provider(provider: Arc<dyn TraceIdProvider>) {
    global().register_provider(provider);
}

pub fn trace_id_provider() -> Option<Arc<dyn TraceIdProvider>> {
    global().trace_id_provider()
}

/// Trace id from the registered provider, or a fresh random one.
pub fn get_or_create_trace_id(ctx: &Context) -> String {
    global().resolve_trace_id(ctx)
}

#[track_caller]
pub fn debug(ctx: &Context, module: &str, message: &str, fields: &[Field]) {
    global().debug(ctx, module, message, fields);
}

#[track_caller]
pub fn info(ctx: &Context, module: &str, message: &str, fields: &[Field]) {
    global().info(ctx, module, message, fields);
}

#[track_caller]
pub fn warn(ctx: &Context, module: &str, message: &str, fields: &[Field]) {
    global().warn(ctx, module, message, fields);
}

#[track_caller]
pub fn error(ctx: &Context, module: &str, message: &str, err: Option<&dyn Error>, fields: &[Field]) {
    global().error(ctx, module, message, err, fields);
}

#[track_caller]
pub fn error_with_code(
    ctx: &Context,
    module: &str,
    message: &str,
    error_code: &str,
    err: Option<&dyn Error>,
    fields: &[Field],
) {
    global().error_with_code(ctx, module, message, error_code, err, fields);
}

/// Log at fatal level through the process-wide facade, then exit.
#[track_caller]
pub fn fatal(ctx: &Context, module: &str, message: &str, err: Option<&dyn Error>, fields: &[Field]) {
    global().fatal(ctx, module, message, err, fields);
}

#[track_caller]
pub fn info_with_request(ctx: &Context, module: &str, message: &str, request: RequestInfo<'_>, fields: &[Field]) {
    global().info_with_request(ctx, module, message, request, fields);
}

#[track_caller]
pub fn error_with_request(
    ctx: &Context,
    module: &str,
    message: &str,
    request: RequestInfo<'_>,
    err: Option<&dyn Error>,
    fields: &[Field],
) {
    global().error_with_request(ctx, module, message, request, err, fields);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::writer::MemoryWriter;
    use std::sync::Barrier;
    use std::thread;

    fn config(service: &str, level: &str) -> LogConfig {
        let mut config = LogConfig::new(service);
        config.level = level.to_string();
        config.enable_console = false;
        config
    }

    #[test]
    fn starts_unconfigured_without_logger() {
        let facade = LogFacade::new();
        assert_eq!(facade.state(), InitState::Unconfigured);
        assert!(facade.logger().is_none());
        assert!(facade.config().is_none());
    }

    #[test]
    fn set_then_get_returns_same_logger() {
        let facade = LogFacade::new();
        let logger: Arc<dyn Logger> =
            Arc::new(JsonLogger::new(BaseFields::default(), Arc::clone(facade.trace_ids())));
        facade.set_logger(Arc::clone(&logger));
        assert!(Arc::ptr_eq(&facade.logger().unwrap(), &logger));
        assert!(Arc::ptr_eq(&facade.active_logger(), &logger));
    }

    #[test]
    fn threshold_scenario() {
        let facade = LogFacade::new();
        let memory = MemoryWriter::new();
        facade.init_with_writers(config("svc", "INFO"), vec![Arc::new(memory.clone())]).unwrap();
        assert_eq!(facade.state(), InitState::Ready);

        let ctx = Context::background();
        facade.debug(&ctx, "mod", "x", &[]);
        facade.info(&ctx, "mod", "y", &[]);

        let records = memory.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, Level::Info);
        assert_eq!(record.message, "y");
        assert_eq!(record.str_field("module"), Some("mod"));
        let trace_id = record.str_field("trace_id").unwrap();
        assert_eq!(trace_id.len(), 32);
        assert!(trace_id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert!(!record.has_field("request_id"));
        assert!(!record.has_field("cost_ms"));
    }

    #[test]
    fn second_init_keeps_first_config() {
        let facade = LogFacade::new();
        let first = MemoryWriter::new();
        let second = MemoryWriter::new();
        facade.init_with_writers(config("first", "ERROR"), vec![Arc::new(first.clone())]).unwrap();
        facade.init_with_writers(config("second", "DEBUG"), vec![Arc::new(second.clone())]).unwrap();

        assert_eq!(facade.config().unwrap().service_name, "first");
        facade.warn(&Context::background(), "mod", "dropped", &[]);
        facade.error(&Context::background(), "mod", "kept", None, &[]);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(first.records()[0].str_field("service"), Some("first"));
    }

    #[test]
    fn failed_init_can_be_retried() {
        let facade = LogFacade::new();
        let err = facade.init_with_writers(config("svc", "LOUD"), Vec::new()).unwrap_err();
        assert!(matches!(err, InitError::Config(_)));
        assert_eq!(facade.state(), InitState::Unconfigured);
        assert!(facade.logger().is_none());

        facade.init_with_writers(config("svc", "DEBUG"), Vec::new()).unwrap();
        assert_eq!(facade.state(), InitState::Ready);
    }

    #[test]
    fn init_replaces_earlier_explicit_logger() {
        let facade = LogFacade::new();
        let explicit = MemoryWriter::new();
        let logger: Arc<dyn Logger> = Arc::new(
            JsonLogger::new(BaseFields::new("explicit", "dev"), Arc::clone(facade.trace_ids()))
                .with_writer(Arc::new(explicit.clone())),
        );
        facade.set_logger(Arc::clone(&logger));

        let configured = MemoryWriter::new();
        facade.init_with_writers(config("svc", "INFO"), vec![Arc::new(configured.clone())]).unwrap();

        assert!(!Arc::ptr_eq(&facade.logger().unwrap(), &logger));
        facade.info(&Context::background(), "mod", "hello", &[]);
        assert!(explicit.is_empty());
        assert_eq!(configured.len(), 1);
        assert_eq!(configured.records()[0].str_field("service"), Some("svc"));
    }

    #[test]
    fn failed_init_keeps_explicit_logger() {
        let facade = LogFacade::new();
        let explicit = MemoryWriter::new();
        facade.set_logger(Arc::new(
            JsonLogger::new(BaseFields::default(), Arc::clone(facade.trace_ids()))
                .with_writer(Arc::new(explicit.clone())),
        ));
        assert!(facade.init_with_writers(config("svc", "LOUD"), Vec::new()).is_err());

        facade.info(&Context::background(), "mod", "still routed", &[]);
        assert_eq!(explicit.len(), 1);
    }

    #[test]
    fn set_logger_after_init_replaces_default() {
        let facade = LogFacade::new();
        let default_out = MemoryWriter::new();
        facade.init_with_writers(config("svc", "INFO"), vec![Arc::new(default_out.clone())]).unwrap();

        let replacement = MemoryWriter::new();
        facade.set_logger(Arc::new(
            JsonLogger::new(BaseFields::default(), Arc::clone(facade.trace_ids()))
                .with_writer(Arc::new(replacement.clone())),
        ));
        facade.info(&Context::background(), "mod", "routed", &[]);
        assert!(default_out.is_empty());
        assert_eq!(replacement.len(), 1);
    }

    #[test]
    fn concurrent_init_runs_once() {
        let facade = Arc::new(LogFacade::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let facade = Arc::clone(&facade);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    facade
                        .init_with_writers(config(&format!("svc-{i}"), "INFO"), Vec::new())
                        .unwrap();
                    facade.config().unwrap().service_name.clone()
                })
            })
            .collect();

        let names: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(names.windows(2).all(|w| w[0] == w[1]), "{names:?}");
        assert_eq!(facade.state(), InitState::Ready);
    }

    #[test]
    fn switching_loggers_under_load_loses_no_calls() {
        const WORKERS: usize = 4;
        const CALLS: usize = 500;

        let facade = Arc::new(LogFacade::new());
        let outputs: Vec<MemoryWriter> = (0..3).map(|_| MemoryWriter::new()).collect();
        let loggers: Vec<Arc<dyn Logger>> = outputs
            .iter()
            .map(|out| {
                Arc::new(
                    JsonLogger::new(BaseFields::default(), Arc::clone(facade.trace_ids()))
                        .with_writer(Arc::new(out.clone())),
                ) as Arc<dyn Logger>
            })
            .collect();
        facade.set_logger(Arc::clone(&loggers[0]));

        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let switcher = {
            let facade = Arc::clone(&facade);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut i = 0;
                while !done.load(Ordering::Acquire) {
                    i += 1;
                    facade.set_logger(Arc::clone(&loggers[i % loggers.len()]));
                }
            })
        };

        let workers: Vec<_> = (0..WORKERS)
            .map(|w| {
                let facade = Arc::clone(&facade);
                thread::spawn(move || {
                    let ctx = Context::background();
                    for i in 0..CALLS {
                        facade.info(&ctx, "load", &format!("{w}-{i}"), &[]);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        done.store(true, Ordering::Release);
        switcher.join().unwrap();

        let mut messages: Vec<String> =
            outputs.iter().flat_map(|out| out.records()).map(|r| r.message).collect();
        assert_eq!(messages.len(), WORKERS * CALLS);
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), WORKERS * CALLS);
    }

    #[test]
    fn provider_is_shared_with_default_logger() {
        struct Fixed;
        impl TraceIdProvider for Fixed {
            fn trace_id(&self, _ctx: &Context) -> Option<String> {
                Some("abc".to_string())
            }
            fn name(&self) -> &str {
                "fixed"
            }
        }

        let facade = LogFacade::new();
        let memory = MemoryWriter::new();
        facade.init_with_writers(config("svc", "INFO"), vec![Arc::new(memory.clone())]).unwrap();
        facade.register_provider(Arc::new(Fixed));

        assert_eq!(facade.resolve_trace_id(&Context::background()), "abc");
        assert_eq!(facade.trace_id_provider().unwrap().name(), "fixed");
        facade.info(&Context::background(), "mod", "m", &[]);
        assert_eq!(memory.records()[0].str_field("trace_id"), Some("abc"));
    }

    #[test]
    fn caller_points_at_facade_user() {
        let facade = LogFacade::new();
        let memory = MemoryWriter::new();
        facade.init_with_writers(config("svc", "INFO"), vec![Arc::new(memory.clone())]).unwrap();

        let line = line!() + 1;
        facade.info(&Context::background(), "mod", "here", &[]);
        assert_eq!(memory.records()[0].str_field("caller"), Some(format!("facade.rs:{line}").as_str()));
    }
}
