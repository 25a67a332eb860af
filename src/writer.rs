use crate::config::LogConfig;
use crate::record::LogRecord;
use parking_lot::Mutex;
use serde_json::Value;
use chrono::{DateTime, Local, NaiveDate};
use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendTimestamp, FileLimit};
use file_rotate::{ContentLimit, FileRotate};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Synchronous destination for rendered [`LogRecord`]s.
///
/// Used by [`JsonLogger`](crate::adapter::JsonLogger) on the caller's
/// thread. Errors are returned to the logger, which reports them on stderr
/// and carries on.
pub trait RecordWriter: Send + Sync {
    fn write_record(&self, record: &LogRecord) -> io::Result<()>;

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes each record as one JSON line.
pub struct JsonWriter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonWriter<W> {
    pub fn new(out: W) -> Self {
        JsonWriter { out: Mutex::new(out) }
    }
}

impl JsonWriter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl JsonWriter<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> RecordWriter for JsonWriter<W> {
    fn write_record(&self, record: &LogRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
        line.push(b'\n');
        self.out.lock().write_all(&line)
    }

    fn flush(&self) -> io::Result<()> {
        self.out.lock().flush()
    }
}

/// Human-readable console output:
/// `2024-01-02 03:04:05 [INFO] main.rs:10 > message key=value ...`.
pub struct ConsoleWriter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> ConsoleWriter<W> {
    pub fn new(out: W) -> Self {
        ConsoleWriter { out: Mutex::new(out) }
    }
}

impl ConsoleWriter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> RecordWriter for ConsoleWriter<W> {
    fn write_record(&self, record: &LogRecord) -> io::Result<()> {
        let mut line = format_console_line(record);
        line.push('\n');
        self.out.lock().write_all(line.as_bytes())
    }

    fn flush(&self) -> io::Result<()> {
        self.out.lock().flush()
    }
}

pub fn format_console_line(record: &LogRecord) -> String {
    let mut line = format!(
        "{} [{}]",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.level.as_str().to_ascii_uppercase()
    );
    if let Some(caller) = record.str_field("caller") {
        line.push(' ');
        line.push_str(caller);
    }
    line.push_str(" > ");
    line.push_str(&record.message);

    for (key, value) in &record.fields {
        if key == "caller" {
            continue;
        }
        line.push(' ');
        line.push_str(key);
        line.push('=');
        match value {
            Value::String(s) if s.is_empty() || s.contains(char::is_whitespace) => {
                line.push_str(&format!("{s:?}"));
            }
            Value::String(s) => line.push_str(s),
            other => line.push_str(&other.to_string()),
        }
    }
    line
}

/// Keeps records in memory. Handy for tests and for embedding the logger
/// where output is inspected programmatically.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl RecordWriter for MemoryWriter {
    fn write_record(&self, record: &LogRecord) -> io::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Name of the active log file inside `LogConfig::dir`. Rotated files
/// append a timestamp (and `.gz` when compressed) to it.
pub const LOG_FILE_NAME: &str = "app.log";

const MIB: u64 = 1024 * 1024;

/// Rotating log file: rolls when the file grows past the size limit and,
/// with daily rolling, on the first write of a new local day.
pub struct RollingFile {
    inner: FileRotate<AppendTimestamp>,
    path: PathBuf,
    daily: bool,
    day: NaiveDate,
}

impl RollingFile {
    fn roll_if_new_day(&mut self, today: NaiveDate) -> io::Result<()> {
        if !self.daily || today == self.day {
            return Ok(());
        }
        self.day = today;
        let has_content = fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false);
        if has_content {
            self.inner.rotate()?;
        }
        Ok(())
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.roll_if_new_day(Local::now().date_naive())?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Rolling JSON file writer for `config.dir`.
///
/// **Rotation**
/// - once `app.log` surpasses `max_size` MB (never when zero);
/// - at the first write of a new day when `daily_roll` is set.
///
/// At most `max_backups` rotated files are kept (all of them when zero) and
/// with `compress` each is gzipped as it rotates. `max_age` is enforced
/// separately by [`prune_expired`].
pub fn rolling_file(config: &LogConfig) -> io::Result<JsonWriter<RollingFile>> {
    fs::create_dir_all(&config.dir)?;
    let path = config.dir.join(LOG_FILE_NAME);

    // FileRotate swallows open failures, so check the file up front.
    let current = OpenOptions::new().create(true).append(true).open(&path)?;
    let day = current
        .metadata()
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Local>::from(t).date_naive())
        .unwrap_or_else(|_| Local::now().date_naive());
    drop(current);

    let files = match config.max_backups {
        0 => FileLimit::Unlimited,
        n => FileLimit::MaxFiles(n),
    };
    let limit = match config.max_size.saturating_mul(MIB) {
        0 => ContentLimit::None,
        bytes => ContentLimit::BytesSurpassed(usize::try_from(bytes).unwrap_or(usize::MAX)),
    };
    let compression = if config.compress { Compression::OnRotate(0) } else { Compression::None };

    let inner = FileRotate::new(
        &path,
        AppendTimestamp::default(files),
        limit,
        compression,
        #[cfg(unix)]
        None,
    );
    Ok(JsonWriter::new(RollingFile { inner, path, daily: config.daily_roll, day }))
}

/// Delete rotated log files in `dir` whose last modification is older than
/// `max_age_days`. Returns how many files were removed. A `max_age_days`
/// of zero disables pruning and the active file is never touched.
///
/// A file that cannot be inspected or removed is reported on stderr and
/// skipped.
pub fn prune_expired(dir: &Path, max_age_days: u64) -> io::Result<usize> {
    if max_age_days == 0 || !dir.exists() {
        return Ok(0);
    }
    let max_age = Duration::from_secs(max_age_days.saturating_mul(24 * 60 * 60));
    let rotated_prefix = format!("{LOG_FILE_NAME}.");
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_name().to_string_lossy().starts_with(&rotated_prefix) {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                eprintln!("failed to inspect log file {}: {}", path.display(), e);
                continue;
            }
        };
        if now.duration_since(modified).unwrap_or_default() <= max_age {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "deleted expired log file");
                removed += 1;
            }
            Err(e) => eprintln!("failed to delete expired log file {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}
