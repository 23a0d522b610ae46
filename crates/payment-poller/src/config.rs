use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PollerError, PollerResult};
use crate::sink::SinkFormat;

const DEFAULT_CSV_PATH: &str = "payments.csv";
const DEFAULT_LABEL: &str = "Venmo";
const DEFAULT_QUERY: &str = "from:venmo@venmo.com";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_LOG_LEVEL: &str = "INFO";
const DEFAULT_LEDGER_PATH: &str = "processed_messages.json";
const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";
const DEFAULT_TOKEN_CACHE_PATH: &str = "token.json";

/// Runtime configuration, sourced from the environment (and `.env`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// CSV file payments are appended to
    pub csv_path: PathBuf,
    /// Gmail label whose messages are candidates
    pub label: String,
    /// Extra Gmail search query, `None` when disabled
    pub query: Option<String>,
    /// Pause between passes in continuous mode
    pub poll_interval: Duration,
    pub log_level: LogLevel,
    pub sink_format: SinkFormat,
    /// JSON list of already processed message ids
    pub ledger_path: PathBuf,
    /// OAuth installed-app client secret
    pub credentials_path: PathBuf,
    /// Where the OAuth library caches tokens between runs
    pub token_cache_path: PathBuf,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from(DEFAULT_CSV_PATH),
            label: DEFAULT_LABEL.to_string(),
            query: Some(DEFAULT_QUERY.to_string()),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            log_level: LogLevel::Info,
            sink_format: SinkFormat::Split,
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            token_cache_path: PathBuf::from(DEFAULT_TOKEN_CACHE_PATH),
        }
    }
}

impl PollerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> PollerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup; unset keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> PollerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let poll_interval_secs = match lookup("POLL_INTERVAL") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| {
                    PollerError::invalid_env("POLL_INTERVAL", &raw, "a positive number of seconds")
                })?,
            None => DEFAULT_POLL_INTERVAL_SECS,
        };

        let log_level = LogLevel::parse(
            &lookup("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        )?;

        let sink_format = match lookup("SINK_FORMAT") {
            Some(raw) => SinkFormat::parse(&raw).ok_or_else(|| {
                PollerError::invalid_env("SINK_FORMAT", &raw, "\"split\" or \"signed\"")
            })?,
            None => SinkFormat::Split,
        };

        let label = lookup("GMAIL_LABEL").unwrap_or_else(|| DEFAULT_LABEL.to_string());
        if label.trim().is_empty() {
            return Err(PollerError::invalid_env("GMAIL_LABEL", &label, "a label name"));
        }

        let query = match lookup("GMAIL_QUERY") {
            Some(q) if q.trim().is_empty() => None,
            Some(q) => Some(q),
            None => Some(DEFAULT_QUERY.to_string()),
        };

        let path = |key: &str, default: &str| {
            PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()))
        };

        Ok(Self {
            csv_path: path("CSV_PATH", DEFAULT_CSV_PATH),
            label,
            query,
            poll_interval: Duration::from_secs(poll_interval_secs),
            log_level,
            sink_format,
            ledger_path: path("PROCESSED_IDS_PATH", DEFAULT_LEDGER_PATH),
            credentials_path: path("CREDENTIALS_PATH", DEFAULT_CREDENTIALS_PATH),
            token_cache_path: path("TOKEN_CACHE_PATH", DEFAULT_TOKEN_CACHE_PATH),
        })
    }
}

/// Log verbosity, spelled the way `LOG_LEVEL` is usually written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(raw: &str) -> PollerResult<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" | "ERROR" => Ok(LogLevel::Error),
            "WARNING" | "WARN" => Ok(LogLevel::Warn),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            "TRACE" => Ok(LogLevel::Trace),
            _ => Err(PollerError::invalid_env(
                "LOG_LEVEL",
                raw,
                "one of DEBUG, INFO, WARNING, ERROR",
            )),
        }
    }

    /// Directive for `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
