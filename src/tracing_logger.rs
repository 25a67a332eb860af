use crate::adapter::{format_caller, BaseFields, Entry};
use crate::context::Context;
use crate::field::Field;
use crate::level::Level;
use crate::logger::{Logger, RequestInfo};
use crate::record::LogRecord;
use crate::terminate::{ProcessExit, Terminator, FATAL_EXIT_CODE};
use crate::trace_id::TraceIdResolver;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::error::Error;
use std::panic::Location;
use std::sync::Arc;

/// Target of every event emitted by [`TracingLogger`].
pub const RECORDS_TARGET: &str = "tracing_log_facade::records";

/// [`Logger`] backend that re-emits records as `tracing` events, for
/// applications whose output pipeline is already a `tracing` subscriber.
///
/// Each event carries `trace_id`, `module` and `caller` as event fields and
/// everything else (base fields, error, request data and the supplied
/// fields) as one JSON object in the `fields` string. Fatal records are
/// emitted at `ERROR` with `fatal = true`.
pub struct TracingLogger {
    min_level: Level,
    enable_caller: bool,
    base: BaseFields,
    trace_ids: Arc<TraceIdResolver>,
    terminator: Arc<dyn Terminator>,
}

impl TracingLogger {
    pub fn new(base: BaseFields, trace_ids: Arc<TraceIdResolver>) -> Self {
        TracingLogger {
            min_level: Level::Debug,
            enable_caller: true,
            base,
            trace_ids,
            terminator: Arc::new(ProcessExit),
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_caller(mut self, enable: bool) -> Self {
        self.enable_caller = enable;
        self
    }

    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    #[track_caller]
    fn emit(&self, level: Level, entry: Entry<'_>) {
        // Caller gets its own event field below.
        let caller = if self.enable_caller { Some(format_caller(Location::caller())) } else { None };
        let record = entry.into_record(level, &self.base, &self.trace_ids);
        let trace_id = record.str_field("trace_id").unwrap_or_default();
        let module = record.str_field("module").unwrap_or_default();
        let caller = caller.as_deref().unwrap_or_default();
        let fields = serde_json::to_string(&ExtraFields(&record)).unwrap_or_default();
        let message = record.message.as_str();
        let fatal = level == Level::Fatal;

        macro_rules! event_at {
            ($lvl:expr) => {
                tracing::event!(
                    target: RECORDS_TARGET,
                    $lvl,
                    trace_id,
                    module,
                    caller,
                    fields = %fields,
                    fatal,
                    "{}",
                    message
                )
            };
        }
        match level {
            Level::Debug => event_at!(tracing::Level::DEBUG),
            Level::Info => event_at!(tracing::Level::INFO),
            Level::Warn => event_at!(tracing::Level::WARN),
            Level::Error | Level::Fatal => event_at!(tracing::Level::ERROR),
        }
    }
}

/// Record fields minus those carried as dedicated event fields.
struct ExtraFields<'a>(&'a LogRecord);

impl Serialize for ExtraFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rest: Vec<&(String, Value)> = self
            .0
            .fields
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "trace_id" | "module"))
            .collect();
        let mut map = serializer.serialize_map(Some(rest.len()))?;
        for (key, value) in rest {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Logger for TracingLogger {
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
