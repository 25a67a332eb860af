use crate::context::Context;
use crate::field::{error_chain, Field};
use crate::level::Level;
use crate::logger::{Logger, RequestInfo};
use crate::record::LogRecord;
use crate::terminate::{ProcessExit, Terminator, FATAL_EXIT_CODE};
use crate::trace_id::TraceIdResolver;
use crate::writer::RecordWriter;
use std::error::Error;
use std::panic::Location;
use std::sync::Arc;

/// Caller value used when no location can be determined.
pub const UNKNOWN_CALLER: &str = "unknown:0";

/// Identity fields stamped on every record a logger produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseFields {
    pub service: String,
    pub env: String,
    pub host: String,
}

impl BaseFields {
    pub fn new(service: impl Into<String>, env: impl Into<String>) -> Self {
        BaseFields { service: service.into(), env: env.into(), host: detect_host() }
    }
}

/// Host name from `HOSTNAME`, then `/etc/hostname`, else `"unknown"`.
pub fn detect_host() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `file:line` for a call site, with the directory part stripped.
pub fn format_caller(location: &Location<'_>) -> String {
    let file = location.file();
    let short = file.rsplit(['/', '\\']).next().unwrap_or(file);
    if short.is_empty() {
        return UNKNOWN_CALLER.to_string();
    }
    format!("{}:{}", short, location.line())
}

/// Everything a single logging call contributes to a record.
pub(crate) struct Entry<'a> {
    pub ctx: &'a Context,
    pub module: &'a str,
    pub message: &'a str,
    pub err: Option<&'a dyn Error>,
    pub error_code: Option<&'a str>,
    pub request: RequestInfo<'a>,
    pub fields: &'a [Field],
    pub caller: Option<&'static Location<'static>>,
}

impl<'a> Entry<'a> {
    pub fn new(ctx: &'a Context, module: &'a str, message: &'a str, fields: &'a [Field]) -> Self {
        Entry {
            ctx,
            module,
            message,
            err: None,
            error_code: None,
            request: RequestInfo::default(),
            fields,
            caller: None,
        }
    }

    pub fn err(mut self, err: Option<&'a dyn Error>) -> Self {
        self.err = err;
        self
    }

    pub fn code(mut self, code: &'a str) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn request(mut self, request: RequestInfo<'a>) -> Self {
        self.request = request;
        self
    }

    pub fn caller(mut self, caller: Option<&'static Location<'static>>) -> Self {
        self.caller = caller;
        self
    }

    /// Build the record: base fields, caller, trace id, module, error,
    /// error code, request id, cost, the supplied fields, then message.
    pub fn into_record(self, level: Level, base: &BaseFields, trace_ids: &TraceIdResolver) -> LogRecord {
        let mut record = LogRecord::new(level);
        record.fields.reserve(self.fields.len() + 9);
        record.push("service", base.service.as_str());
        record.push("env", base.env.as_str());
        record.push("host", base.host.as_str());
        if let Some(location) = self.caller {
            record.push("caller", format_caller(location));
        }
        record.push("trace_id", trace_ids.resolve_or_create(self.ctx));
        record.push("module", self.module);
        if let Some(err) = self.err {
            record.push("error", error_chain(err));
        }
        if let Some(code) = self.error_code {
            record.push("error_code", code);
        }
        if let Some(request_id) = self.request.request_id() {
            record.push("request_id", request_id);
        }
        if let Some(cost_ms) = self.request.cost_ms() {
            record.push("cost_ms", cost_ms);
        }
        for field in self.fields {
            record.push_field(field);
        }
        record.message = self.message.to_string();
        record
    }
}

/// Default [`Logger`] backend: renders structured JSON records and hands
/// them to a set of [`RecordWriter`]s.
///
/// Calls below the configured minimum level return after a single
/// comparison, before any field is rendered.
pub struct JsonLogger {
    min_level: Level,
    enable_caller: bool,
    base: BaseFields,
    trace_ids: Arc<TraceIdResolver>,
    writers: Vec<Arc<dyn RecordWriter>>,
    terminator: Arc<dyn Terminator>,
}

impl JsonLogger {
    pub fn new(base: BaseFields, trace_ids: Arc<TraceIdResolver>) -> Self {
        JsonLogger {
            min_level: Level::Debug,
            enable_caller: true,
            base,
            trace_ids,
            writers: Vec::new(),
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

    pub fn with_writer(mut self, writer: Arc<dyn RecordWriter>) -> Self {
        self.writers.push(writer);
        self
    }

    pub fn with_writers(mut self, writers: impl IntoIterator<Item = Arc<dyn RecordWriter>>) -> Self {
        self.writers.extend(writers);
        self
    }

    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn level(&self) -> Level {
        self.min_level
    }

    pub fn base(&self) -> &BaseFields {
        &self.base
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    #[track_caller]
    fn emit(&self, level: Level, entry: Entry<'_>) {
        let caller = if self.enable_caller { Some(Location::caller()) } else { None };
        let record = entry.caller(caller).into_record(level, &self.base, &self.trace_ids);
        self.write(&record);
    }

    fn write(&self, record: &LogRecord) {
        for writer in &self.writers {
            if let Err(e) = writer.write_record(record) {
                eprintln!("log writer failed, dropping record: {}", e);
            }
        }
    }

    fn flush(&self) {
        for writer in &self.writers {
            if let Err(e) = writer.flush() {
                eprintln!("log writer flush failed: {}", e);
            }
        }
    }
}

impl Logger for JsonLogger {
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
        self.flush();
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
