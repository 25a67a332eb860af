use crate::env::{self, LOG_DIR_ENV, LOG_LEVEL_ENV};
use crate::level::{Level, ParseLevelError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Logging configuration handed to [`LogFacade::init`](crate::facade::LogFacade::init).
///
/// Field names match the keys of the `log.yaml` file format.
///
/// **Fields**
/// - `service_name`, `env`: identity stamped on every record.
/// - `level`: minimum severity (DEBUG/INFO/WARN/ERROR/FATAL, any case).
///   Validated at initialization; an unknown value fails it.
/// - `dir`: directory for `app.log` and its rotated copies.
/// - `max_size` (MB), `max_backups`, `max_age` (days), `compress`: rotation
///   thresholds; zero disables the size, backup and age limits.
/// - `daily_roll`: roll the file once per day.
/// - `enable_console`, `console_json`: mirror records to stdout, as JSON
///   lines or as human-readable text.
/// - `enable_caller`: tag records with the caller's `file:line`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub service_name: String,
    pub env: String,
    pub level: String,
    pub dir: PathBuf,
    pub max_size: u64,
    pub max_backups: usize,
    pub max_age: u64,
    pub compress: bool,
    pub daily_roll: bool,
    pub enable_console: bool,
    pub console_json: bool,
    pub enable_caller: bool,
}

impl LogConfig {
    /// Defaults for `service_name`: INFO level, `./logs`, 100 MB files, 180
    /// backups kept for 180 days, compression and daily rolling on, text
    /// console output on.
    pub fn new(service_name: impl Into<String>) -> Self {
        LogConfig {
            service_name: service_name.into(),
            env: "dev".to_string(),
            level: "INFO".to_string(),
            dir: PathBuf::from("./logs"),
            max_size: 100,
            max_backups: 180,
            max_age: 180,
            compress: true,
            daily_roll: true,
            enable_console: true,
            console_json: false,
            enable_caller: true,
        }
    }

    pub fn parsed_level(&self) -> Result<Level, ConfigError> {
        self.level.parse().map_err(ConfigError::InvalidLevel)
    }

    /// Tune defaults for the environment: dev and test force console output
    /// on, and an unset level becomes DEBUG in dev and INFO elsewhere.
    pub fn adjust_by_env(&mut self) {
        if self.env.is_empty() || self.env == "dev" {
            self.env = env::detect_env();
        }
        match self.env.as_str() {
            "prod" | "production" | "docker" => {
                if self.level.is_empty() {
                    self.level = "INFO".to_string();
                }
            }
            "test" | "testing" => {
                if self.level.is_empty() {
                    self.level = "INFO".to_string();
                }
                self.enable_console = true;
            }
            "dev" | "development" => {
                if self.level.is_empty() {
                    self.level = "DEBUG".to_string();
                }
                self.enable_console = true;
            }
            _ => {}
        }
    }

    /// Apply `LOG_LEVEL` and `LOG_DIR` if set.
    pub fn apply_env_overrides(&mut self) {
        if let Some(level) = env::non_empty(LOG_LEVEL_ENV) {
            self.level = level;
        }
        if let Some(dir) = env::non_empty(LOG_DIR_ENV) {
            self.dir = PathBuf::from(dir);
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(env::detect_service_name())
    }
}

/// Error raised while building or loading a [`LogConfig`].
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid log level: {0}")]
    InvalidLevel(#[from] ParseLevelError),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Partial logger section: only keys present in the file override defaults.
#[derive(Debug, Default, Deserialize)]
struct LoggerSection {
    service_name: Option<String>,
    env: Option<String>,
    level: Option<String>,
    dir: Option<PathBuf>,
    max_size: Option<u64>,
    max_backups: Option<usize>,
    max_age: Option<u64>,
    compress: Option<bool>,
    daily_roll: Option<bool>,
    enable_console: Option<bool>,
    console_json: Option<bool>,
    enable_caller: Option<bool>,
}

impl LoggerSection {
    fn apply(self, config: &mut LogConfig) {
        macro_rules! overlay {
            ($from:ident => $to:ident: $($name:ident),*) => {
                $(if let Some(v) = $from.$name { $to.$name = v; })*
            };
        }
        let section = self;
        overlay!(section => config:
            service_name, env, level, dir, max_size, max_backups, max_age, compress, daily_roll,
            enable_console, console_json, enable_caller
        );
    }
}

#[derive(Debug, Default, Deserialize)]
struct AppSection {
    name: Option<String>,
}

/// Project-wide `application.yaml` layout; only `app.name` and the
/// `logger` section matter here.
#[derive(Debug, Default, Deserialize)]
struct ApplicationFile {
    app: Option<AppSection>,
    logger: Option<LoggerSection>,
}

/// Locates and parses logging configuration files.
///
/// Looks in `config_dir` (default `resource`), in order:
/// 1. `log.yaml`: flat logger keys;
/// 2. `application.yaml`: keys nested under `logger:`, service from `app.name`;
/// 3. `application_{ENV}.yaml`: same layout, for the detected environment;
///
/// and falls back to defaults. Missing files are skipped; a file that exists
/// but cannot be read or parsed is an error.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_dir: PathBuf,
    env: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        ConfigLoader { config_dir: PathBuf::from("resource"), env: env::detect_env() }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    pub fn load(&self) -> Result<LogConfig, ConfigError> {
        let mut config = match self.find()? {
            Some(config) => config,
            None => {
                let mut config = LogConfig::new(env::detect_service_name());
                config.adjust_by_env();
                config
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn find(&self) -> Result<Option<LogConfig>, ConfigError> {
        let log_yaml = self.config_dir.join("log.yaml");
        if log_yaml.exists() {
            return load_log_yaml(&log_yaml).map(Some);
        }

        let mut candidates = vec![self.config_dir.join("application.yaml")];
        if !self.env.is_empty() {
            candidates.push(self.config_dir.join(format!("application_{}.yaml", self.env)));
        }
        for path in candidates {
            if !path.exists() {
                continue;
            }
            if let Some(config) = load_application_yaml(&path)? {
                return Ok(Some(config));
            }
        }
        Ok(None)
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })
}

fn parse<T: for<'de> Deserialize<'de> + Default>(path: &Path, text: &str) -> Result<T, ConfigError> {
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

/// Parse a flat `log.yaml` file.
pub fn load_log_yaml(path: &Path) -> Result<LogConfig, ConfigError> {
    let section: LoggerSection = parse(path, &read(path)?)?;
    let mut config = LogConfig::new(env::detect_service_name());
    section.apply(&mut config);
    config.adjust_by_env();
    Ok(config)
}

/// Parse an `application*.yaml` file. `Ok(None)` when it has no `logger`
/// section.
pub fn load_application_yaml(path: &Path) -> Result<Option<LogConfig>, ConfigError> {
    let file: ApplicationFile = parse(path, &read(path)?)?;
    let Some(section) = file.logger else {
        return Ok(None);
    };
    let service = file
        .app
        .and_then(|app| app.name)
        .unwrap_or_else(env::detect_service_name);
    let mut config = LogConfig::new(service);
    section.apply(&mut config);
    config.adjust_by_env();
    Ok(Some(config))
}

/// Parse a single file, picking the flat layout when the file name
/// contains `log.yaml` and the `application.yaml` layout otherwise.
pub fn load_file(path: &Path) -> Result<LogConfig, ConfigError> {
    let is_log_yaml = path
        .file_name()
        .map(|n| n.to_string_lossy().contains("log.yaml"))
        .unwrap_or(false);
    let mut config = if is_log_yaml {
        load_log_yaml(path)?
    } else {
        load_application_yaml(path)?.unwrap_or_else(|| {
            let mut config = LogConfig::new(env::detect_service_name());
            config.adjust_by_env();
            config
        })
    };
    config.apply_env_overrides();
    Ok(config)
}
