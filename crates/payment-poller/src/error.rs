//! Unified error handling for the poller.
//!
//! Every fallible step of a pass returns `PollerError`, so the run loop can
//! decide whether a failure is fatal, worth retrying on the next interval, or
//! a reason to stop the current pass before the ledger is touched.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollerError {
    /// Environment variable holds a value we cannot use
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credentials missing or the authorization flow failed
    #[error("Authorization failed: {0}")]
    Auth(String),

    /// Mail provider call failed (network, quota, provider error)
    #[error("Failed to {operation}: {message}")]
    Fetch { operation: String, message: String },

    /// Ledger file could not be read or written
    #[error("Ledger I/O error at {}: {source}", path.display())]
    Ledger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ledger file exists but is not a JSON list of ids
    #[error("Ledger at {} is corrupt: {source}", path.display())]
    LedgerFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// CSV file could not be opened or written
    #[error("Sink write failed for {}: {source}", path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Existing CSV header does not match the configured format
    #[error("Sink {} has header {found:?}, expected {expected:?}", path.display())]
    SinkSchema {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

impl PollerError {
    /// Create a fetch error for a named provider operation
    pub fn fetch(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        PollerError::Fetch {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    pub fn auth(err: impl std::fmt::Display) -> Self {
        PollerError::Auth(err.to_string())
    }

    /// Create a config error for an env var with an unusable value
    pub fn invalid_env(var_name: &str, value: &str, expected: &str) -> Self {
        PollerError::Config(format!(
            "{} must be {}, got {:?}",
            var_name, expected, value
        ))
    }

    pub fn sink_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        PollerError::Sink {
            path: path.into(),
            source: csv::Error::from(err),
        }
    }

    /// Only provider failures are expected to clear up by the next poll
    pub fn is_transient(&self) -> bool {
        matches!(self, PollerError::Fetch { .. })
    }
}

pub type PollerResult<T> = Result<T, PollerError>;
