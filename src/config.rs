//! Configuration loading.
//!
//! Settings come from a TOML file (`birdmon.toml` by default, optional),
//! then environment variables (a `.env` file is honoured), then command
//! line flags applied by the binary. Every field has a default so an empty
//! file, or no file at all, is a valid configuration.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::logging::LogLevel;

pub const DEFAULT_CONFIG_FILE: &str = "birdmon.toml";
pub const DEFAULT_DATABASE_FILE: &str = "birds.db";
pub const DEFAULT_TABLE: &str = "detections";
pub const DEFAULT_API_PATH: &str = "/api/v2/detections";
pub const DEFAULT_WEATHER_URL: &str = "https://archive-api.open-meteo.com";
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;
/// Longest lookback or synthetic span accepted, about ten years.
pub const MAX_WINDOW_DAYS: i64 = 3660;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Sqlite,
    Postgres,
    Api,
    Synthetic,
}

impl SourceKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "db" | "file" => Some(SourceKind::Sqlite),
            "postgres" | "postgresql" => Some(SourceKind::Postgres),
            "api" | "http" => Some(SourceKind::Api),
            "synthetic" | "demo" => Some(SourceKind::Synthetic),
            _ => None,
        }
    }
}

/// What to show when the configured source cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fallback {
    Synthetic,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub fallback: Fallback,
    pub database_file: PathBuf,
    pub table: String,
    /// Replaces `SELECT * FROM <table>` when set.
    pub query: Option<String>,
    /// Read from `DATABASE_URL` when unset.
    pub postgres_url: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            kind: SourceKind::Sqlite,
            fallback: Fallback::Synthetic,
            database_file: PathBuf::from(DEFAULT_DATABASE_FILE),
            table: DEFAULT_TABLE.to_string(),
            query: None,
            postgres_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub path: String,
    pub page_size: usize,
    pub max_pages: usize,
    pub timeout_secs: u64,
    /// Window requested when no explicit start date is given.
    pub lookback_days: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "http://localhost:8080".to_string(),
            path: DEFAULT_API_PATH.to_string(),
            page_size: 500,
            max_pages: 200,
            timeout_secs: 30,
            lookback_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub enabled: bool,
    pub base_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        WeatherConfig {
            enabled: false,
            base_url: DEFAULT_WEATHER_URL.to_string(),
            latitude: 0.0,
            longitude: 0.0,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_confidence: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig { min_confidence: DEFAULT_MIN_CONFIDENCE }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub days: u32,
    pub detections_per_day: u32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig {
            days: 30,
            detections_per_day: 120,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub console_timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
            console_timestamps: false,
        }
    }
}

impl LoggingConfig {
    pub fn min_level(&self) -> LogLevel {
        LogLevel::parse(&self.level).unwrap_or(LogLevel::Info)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub api: ApiConfig,
    pub weather: WeatherConfig,
    pub filters: FilterConfig,
    pub synthetic: SyntheticConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read config {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "cannot parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Parses a TOML document. Missing tables and keys take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, or from `birdmon.toml` in the
    /// working directory when no path is given. An explicit path must exist;
    /// the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::read_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::read_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };

        config.apply_env(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(ConfigError::Parse)
    }

    /// Applies environment overrides through `lookup`, so tests can supply
    /// variables without touching the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            if self.source.postgres_url.is_none() {
                self.source.postgres_url = Some(url);
            }
        }
        if let Some(file) = lookup("BIRDMON_DATABASE") {
            self.source.database_file = PathBuf::from(file);
        }
        if let Some(url) = lookup("BIRDMON_API_URL") {
            self.api.base_url = url;
        }
        if let Some(kind) = lookup("BIRDMON_SOURCE").and_then(|k| SourceKind::parse(&k)) {
            self.source.kind = kind;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_identifier(&self.source.table) {
            return Err(ConfigError::Invalid(format!(
                "table name '{}' must be a plain identifier",
                self.source.table
            )));
        }
        if self.api.page_size == 0 {
            return Err(ConfigError::Invalid("api.page_size must be positive".into()));
        }
        if self.api.max_pages == 0 {
            return Err(ConfigError::Invalid("api.max_pages must be positive".into()));
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.api.lookback_days) {
            return Err(ConfigError::Invalid(format!(
                "api.lookback_days {} is outside 1..={}",
                self.api.lookback_days, MAX_WINDOW_DAYS
            )));
        }
        if i64::from(self.synthetic.days) > MAX_WINDOW_DAYS {
            return Err(ConfigError::Invalid(format!(
                "synthetic.days {} is above {}",
                self.synthetic.days, MAX_WINDOW_DAYS
            )));
        }
        if !(0.0..=1.0).contains(&self.filters.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "filters.min_confidence {} is outside 0..=1",
                self.filters.min_confidence
            )));
        }
        if self.weather.enabled {
            if !(-90.0..=90.0).contains(&self.weather.latitude) {
                return Err(ConfigError::Invalid("weather.latitude is outside -90..=90".into()));
            }
            if !(-180.0..=180.0).contains(&self.weather.longitude) {
                return Err(ConfigError::Invalid("weather.longitude is outside -180..=180".into()));
            }
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
