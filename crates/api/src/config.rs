//! Application configuration loaded from environment variables.

use std::time::Duration;

use allocation::{BulkConfig, LinePolicy};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `plain` or `json` (default: `plain`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `LOCK_TIMEOUT_MS`: row lock wait before a movement is rejected (default: `5000`)
/// - `BULK_IN_INVALID_LINES` / `BULK_OUT_INVALID_LINES`: `skip` or `abort` (default: `skip`)
/// - `EXPIRY_WARNING_DAYS`: default window of the expiry report (default: `30`)
///
/// Unparseable values fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub lock_timeout: Duration,
    pub bulk: BulkConfig,
    pub expiry_warning_days: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            lock_timeout: parse_var::<u64>(&lookup, "LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            bulk: BulkConfig {
                stock_in_invalid_lines: lookup("BULK_IN_INVALID_LINES")
                    .and_then(|v| v.parse::<LinePolicy>().ok())
                    .unwrap_or(defaults.bulk.stock_in_invalid_lines),
                stock_out_invalid_lines: lookup("BULK_OUT_INVALID_LINES")
                    .and_then(|v| v.parse::<LinePolicy>().ok())
                    .unwrap_or(defaults.bulk.stock_out_invalid_lines),
            },
            expiry_warning_days: parse_var::<i64>(&lookup, "EXPIRY_WARNING_DAYS")
                .filter(|days| *days >= 0)
                .unwrap_or(defaults.expiry_warning_days),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            database_url: None,
            database_max_connections: 10,
            lock_timeout: Duration::from_millis(5000),
            bulk: BulkConfig::default(),
            expiry_warning_days: 30,
        }
    }
}
