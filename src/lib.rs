//! Structured logging facade with trace-id correlation, typed fields and
//! swappable backends.
//!
//! Call sites log through the crate-level functions ([`info`], [`error`],
//! ...) or through a [`LogFacade`] they were handed. Every record carries a
//! `trace_id`, a module tag and the supplied [`Field`]s; the active
//! [`Logger`] decides where it goes.

pub mod level;
pub mod field;
pub mod context;
pub mod trace_id;
pub mod record;
pub mod logger;
pub mod terminate;
pub mod writer;
pub mod adapter;

pub mod env;
pub mod config;
pub mod init;
pub mod facade;

pub mod sink;
pub mod noop_sink;
pub mod backend;
pub mod remote;

#[cfg(feature = "remote")]
pub mod http_sink;
#[cfg(feature = "remote")]
pub mod clickhouse;

pub mod bridge;
pub mod tracing_logger;

pub use adapter::{BaseFields, JsonLogger};
pub use config::{ConfigError, ConfigLoader, LogConfig};
pub use context::Context;
pub use facade::{
    debug, error, error_with_code, fatal, get_logger, get_or_create_trace_id, global, info, info_with_request,
    error_with_request, init_logger, init_logger_from_dir, init_logger_from_file, register_trace_id_provider,
    set_logger, trace_id_provider, warn, InitState, LogFacade,
};
pub use field::{Field, FieldValue};
pub use init::InitError;
pub use level::Level;
pub use logger::{Logger, RequestInfo};
pub use record::LogRecord;
pub use trace_id::{new_trace_id, TraceIdProvider, TraceIdResolver};
