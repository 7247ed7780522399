//! TOML-based configuration for tabula.
//!
//! Supports a config file (tabula.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [compile]
//! dialect = "postgres"
//! cte_prefix = "t"
//!
//! [connections.local]
//! driver = "sqlite"
//! path = "${DATA_DIR}/demo.db"
//! timeout = "30s"
//!
//! [connections.scratch]
//! driver = "sqlite"
//! path = ":memory:"
//! ```

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::compile::CompileOptions;
use crate::sql::Dialect;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("no config file at {0}")]
    FileNotFound(PathBuf),

    #[error("reading config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("environment variable `{0}` is not set")]
    MissingEnvVar(String),

    #[error("no connection named `{0}`")]
    ConnectionNotFound(String),

    #[error("invalid duration `{0}`, expected e.g. 500ms, 30s, 5m or 1h")]
    InvalidDuration(String),

    #[error("unsupported driver `{0}`")]
    UnsupportedDriver(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Compiler defaults.
    pub compile: CompileSettings,

    /// Named database connections.
    pub connections: HashMap<String, ConnectionSettings>,
}

/// Compiler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompileSettings {
    /// Target dialect name (duckdb, postgres, tsql, ...).
    pub dialect: String,

    /// Prefix of generated table aliases and CTE names.
    pub cte_prefix: String,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            dialect: Dialect::default().to_string(),
            cte_prefix: "t".to_string(),
        }
    }
}

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Sqlite,
}

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Sqlite => "sqlite",
        }
    }
}

impl FromStr for Driver {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            _ => Err(SettingsError::UnsupportedDriver(s.to_string())),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// Database driver (sqlite).
    pub driver: String,

    /// Database file, or `:memory:` (supports ${ENV_VAR} expansion).
    #[serde(default = "default_path")]
    pub path: String,

    /// Execution timeout (e.g., "30s", "5m").
    #[serde(default)]
    pub timeout: Option<String>,
}

fn default_path() -> String {
    ":memory:".to_string()
}

impl ConnectionSettings {
    /// An in-memory SQLite database.
    pub fn sqlite_memory() -> Self {
        Self {
            driver: Driver::Sqlite.to_string(),
            path: default_path(),
            timeout: None,
        }
    }

    /// Set the execution timeout.
    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Get the driver type.
    pub fn driver_type(&self) -> Result<Driver, SettingsError> {
        self.driver.parse()
    }

    /// Get the path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.path)
    }

    /// Get the parsed execution timeout.
    pub fn timeout_duration(&self) -> Result<Option<Duration>, SettingsError> {
        self.timeout.as_deref().map(parse_duration).transpose()
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.compile_options()?;
        Ok(settings)
    }

    /// `$TABULA_CONFIG` if set, else the first of `./tabula.toml` and
    /// `<config dir>/tabula/config.toml` that exists, else defaults.
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("TABULA_CONFIG") {
            return Self::from_file(path);
        }

        let candidates = [
            Some(PathBuf::from("tabula.toml")),
            dirs::config_dir().map(|dir| dir.join("tabula").join("config.toml")),
        ];
        match candidates.into_iter().flatten().find(|p| p.exists()) {
            Some(path) => Self::from_file(path),
            None => Ok(Settings::default()),
        }
    }

    /// Compiler options from the `[compile]` section.
    pub fn compile_options(&self) -> Result<CompileOptions, SettingsError> {
        let dialect: Dialect = self.compile.dialect.parse().map_err(|_| {
            SettingsError::InvalidConfig(format!("unknown dialect `{}`", self.compile.dialect))
        })?;
        if self.compile.cte_prefix.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "cte_prefix must not be empty".to_string(),
            ));
        }
        Ok(CompileOptions::default()
            .with_dialect(dialect)
            .with_cte_prefix(self.compile.cte_prefix.clone()))
    }

    /// Get a connection by name.
    pub fn get_connection(&self, name: &str) -> Result<&ConnectionSettings, SettingsError> {
        self.connections
            .get(name)
            .ok_or_else(|| SettingsError::ConnectionNotFound(name.to_string()))
    }

    /// Get the default connection (`default` if defined, else the first by name).
    pub fn default_connection(&self) -> Option<(&str, &ConnectionSettings)> {
        if let Some(conn) = self.connections.get("default") {
            return Some(("default", conn));
        }
        self.connections
            .iter()
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(k, v)| (k.as_str(), v))
    }
}

static ENV_VAR: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"\$\{([^}]*)\}|\$([A-Za-z0-9_]+)"));

/// Substitute `${VAR}` and `$VAR` with values from the environment. A `$`
/// not followed by a name is kept as is.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let pattern = ENV_VAR
        .as_ref()
        .map_err(|e| SettingsError::InvalidConfig(e.to_string()))?;
    if let Some(open) = s.rfind("${") {
        if !s[open..].contains('}') {
            return Err(SettingsError::InvalidConfig(format!(
                "unterminated variable in `{s}`"
            )));
        }
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in pattern.captures_iter(s) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2))) else {
            continue;
        };
        let value = env::var(name.as_str())
            .map_err(|_| SettingsError::MissingEnvVar(name.as_str().to_string()))?;
        out.push_str(&s[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(out)
}

/// Parse a duration like `500ms`, `30s`, `5m` or `1h`. A bare number is
/// seconds.
pub fn parse_duration(s: &str) -> Result<Duration, SettingsError> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| SettingsError::InvalidDuration(s.to_string()))?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(SettingsError::InvalidDuration(s.to_string())),
    }
}
