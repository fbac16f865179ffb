//! Core configuration loaded from TOML.
//!
//! # Responsibility
//! - Describe database, logging, workflow, audit and search-log settings.
//! - Resolve the config file from an explicit path or `LIMA_CONFIG`.
//!
//! # Invariants
//! - Every section is optional and falls back to defaults.
//! - Unknown keys are rejected at parse time.
//! - A loaded config has passed `validate()`.

use crate::db::DEFAULT_BUSY_TIMEOUT;
use serde::Deserialize;
use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file when no path is given.
pub const CONFIG_ENV_VAR: &str = "LIMA_CONFIG";
const MAX_CONFIG_FILE_SIZE: usize = 64 * 1024;
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
const MAX_AUDIT_PAGE_SIZE: u32 = 1_000;
const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub workflow: WorkflowConfig,
    pub audit: AuditConfig,
    pub search_log: SearchLogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite file. `None` means an in-memory database.
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: duration_ms(DEFAULT_BUSY_TIMEOUT),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `None` uses the build-mode default.
    pub level: Option<String>,
    /// Absolute log directory. File logging is off when unset.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Default budget for `decide`; `None` waits up to the busy timeout.
    pub decide_timeout_ms: Option<u64>,
    /// Age after which pending suggestions count as stale.
    pub stale_after_days: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            decide_timeout_ms: None,
            stale_after_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub page_size: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { page_size: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchLogConfig {
    pub enabled: bool,
}

impl Default for SearchLogConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl CoreConfig {
    /// Loads configuration from `path`, or from `LIMA_CONFIG` when `path`
    /// is `None`. Without either, returns defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(resolved) = resolve_path(path)? else {
            return Ok(Self::default());
        };
        let bytes = fs::read(&resolved).map_err(|err| {
            ConfigError::Io(format!("cannot read `{}`: {err}", resolved.display()))
        })?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "config file exceeds {MAX_CONFIG_FILE_SIZE} bytes"
            )));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "database.busy_timeout_ms must be positive".to_string(),
            ));
        }
        if let Some(path) = &self.database.path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("database.path cannot be empty".to_string()));
            }
        }
        if let Some(dir) = &self.logging.dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "logging.dir must be absolute, got `{}`",
                    dir.display()
                )));
            }
        }
        if self.workflow.decide_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "workflow.decide_timeout_ms must be positive".to_string(),
            ));
        }
        if self.audit.page_size == 0 || self.audit.page_size > MAX_AUDIT_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "audit.page_size must be within 1..={MAX_AUDIT_PAGE_SIZE}"
            )));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    pub fn decide_timeout(&self) -> Option<Duration> {
        self.workflow.decide_timeout_ms.map(Duration::from_millis)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(u64::from(self.workflow.stale_after_days) * MS_PER_DAY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(message) => write!(f, "config io error: {message}"),
            Self::Parse(message) => write!(f, "config parse error: {message}"),
            Self::Invalid(message) => write!(f, "config invalid: {message}"),
        }
    }
}

impl Error for ConfigError {}

fn resolve_path(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    let resolved = match path {
        Some(path) => path.to_path_buf(),
        None => match env::var(CONFIG_ENV_VAR) {
            Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
            _ => return Ok(None),
        },
    };
    if resolved.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(
            "config path exceeds max length".to_string(),
        ));
    }
    Ok(Some(resolved))
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
