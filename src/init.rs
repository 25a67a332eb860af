use crate::adapter::{BaseFields, JsonLogger};
use crate::config::{ConfigError, LogConfig};
use crate::trace_id::TraceIdResolver;
use crate::writer::{self, ConsoleWriter, JsonWriter, RecordWriter};
use std::path::PathBuf;
use std::sync::Arc;

/// Error returned by the initialization entry points.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create log directory {dir}: {source}")]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open log file in {dir}: {source}")]
    OpenFile {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install global tracing subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Writers used by a plain [`LogFacade::init`](crate::facade::LogFacade::init).
///
/// **Behavior**
/// - creates `config.dir` if needed and prunes files older than `max_age`;
/// - always writes JSON lines to the rotating `app.log` file;
/// - with `enable_console`, mirrors every record to stdout, as JSON when
///   `console_json` is set and as text otherwise.
pub fn default_writers(config: &LogConfig) -> Result<Vec<Arc<dyn RecordWriter>>, InitError> {
    std::fs::create_dir_all(&config.dir)
        .map_err(|source| InitError::CreateDir { dir: config.dir.clone(), source })?;

    match writer::prune_expired(&config.dir, config.max_age) {
        Ok(0) => {}
        Ok(removed) => tracing::debug!(removed, dir = %config.dir.display(), "pruned expired log files"),
        Err(e) => eprintln!("failed to prune log directory {}: {}", config.dir.display(), e),
    }

    let file = writer::rolling_file(config).map_err(|source| InitError::OpenFile { dir: config.dir.clone(), source })?;
    let mut writers: Vec<Arc<dyn RecordWriter>> = vec![Arc::new(file)];
    if config.enable_console {
        if config.console_json {
            writers.push(Arc::new(JsonWriter::stdout()));
        } else {
            writers.push(Arc::new(ConsoleWriter::stdout()));
        }
    }
    Ok(writers)
}

/// Build the default backend for `config`, writing to `writers`.
///
/// Fails only when `config.level` is not a known severity.
pub fn build_logger(
    config: &LogConfig,
    writers: Vec<Arc<dyn RecordWriter>>,
    trace_ids: Arc<TraceIdResolver>,
) -> Result<JsonLogger, InitError> {
    let level = config.parsed_level()?;
    Ok(JsonLogger::new(BaseFields::new(&config.service_name, &config.env), trace_ids)
        .with_level(level)
        .with_caller(config.enable_caller)
        .with_writers(writers))
}
