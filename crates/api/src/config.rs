//! Application configuration loaded from environment variables.

use std::str::FromStr;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs in memory
/// - `MAX_CAS_ATTEMPTS`: compare-and-set retries per mutation (default: `5`)
/// - `LOW_STOCK_THRESHOLD`: threshold for `lowStock=true` (default: `10`)
/// - `DEFAULT_HISTORY_LIMIT`: history page size when none is given (default: `50`)
///
/// Values that fail to parse fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub max_cas_attempts: u32,
    pub low_stock_threshold: i64,
    pub default_history_limit: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parsed(&lookup, "LOG_FORMAT").unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_cas_attempts: parsed(&lookup, "MAX_CAS_ATTEMPTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_cas_attempts),
            low_stock_threshold: parsed(&lookup, "LOW_STOCK_THRESHOLD")
                .unwrap_or(defaults.low_stock_threshold),
            default_history_limit: parsed(&lookup, "DEFAULT_HISTORY_LIMIT")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.default_history_limit),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            max_cas_attempts: inventory::DEFAULT_MAX_ATTEMPTS,
            low_stock_threshold: 10,
            default_history_limit: 50,
        }
    }
}
