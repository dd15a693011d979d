//! Error taxonomy for the backend lifecycle.
//!
//! A missing formatter configuration file is deliberately absent from this
//! module: it is an expected outcome, not an error. Teardown timeouts are
//! absent too; they are logged and resolved by a forced release.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The formatter executable could not be resolved to a usable path.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("formatter executable not found: {target}")]
    NotFound { target: String },
    #[error("executable at {} has not been approved (run `fmtlink trust <path>`)", path.display())]
    Untrusted { path: PathBuf },
    #[error("invalid executable path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },
}

/// The persistent protocol client could not be brought up.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("spawning {}: {source}", command.display())]
    Spawn {
        command: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("handshake timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("formatter closed the connection")]
    Closed,
}

/// A single Legacy-mode formatting invocation failed.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("spawning {}: {source}", command.display())]
    Spawn {
        command: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("formatter did not finish within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("formatter exited with {}: {stderr}", code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    Failed { code: Option<i32>, stderr: String },
    #[error("formatter output was not valid UTF-8")]
    NonUtf8Output,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Settings were present but could not be turned into validated values.
#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    #[error("backend.executable must not be empty")]
    EmptyExecutable,
    #[error("backend.path must not be empty when set")]
    EmptyPath,
    #[error("discovery.config_file_names must contain at least one name")]
    NoConfigFileNames,
    #[error("discovery.max_results must be at least 1")]
    ZeroMaxResults,
    #[error("lifecycle.{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },
    #[error("loading settings from {source_name}: {reason}")]
    Load { source_name: String, reason: String },
}

/// Failure of a single reinitialization run.
///
/// Always caught at the run boundary and logged; never reaches a trigger caller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("settings unavailable: {0}")]
    Settings(#[from] SettingsError),
    #[error("resolution failed: {0}")]
    Resolution(#[from] ResolveError),
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),
}

impl SessionError {
    /// Short taxonomy label used in structured log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Settings(_) => "settings",
            Self::Resolution(_) => "resolution_failed",
            Self::Connection(_) => "connection_failed",
        }
    }
}
