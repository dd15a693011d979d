//! Resolved backend settings shared across crates.
//!
//! Raw TOML shapes (with `Option` fields and millisecond integers) are private
//! to this module and validated at the deserialization boundary through
//! `#[serde(try_from)]`. Holding a value of these types proves it is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{Mode, SettingsError};

/// Executable looked up on `PATH` when no explicit path is configured.
pub const DEFAULT_EXECUTABLE: &str = "dprint";

/// File names that mark a directory as configured for the formatter.
pub const DEFAULT_CONFIG_FILE_NAMES: &[&str] =
    &["dprint.json", ".dprint.json", "dprint.jsonc", ".dprint.jsonc"];

const DEFAULT_MAX_RESULTS: usize = 1;
const DEFAULT_MAX_DEPTH: usize = 8;
const DEFAULT_DEBOUNCE_MS: u64 = 250;
const DEFAULT_STOP_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_START_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_INVOKE_TIMEOUT_MS: u64 = 30_000;

/// Everything a single reinitialization run reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
}

// ============================================================================
// [backend]
// ============================================================================

#[derive(Deserialize)]
struct RawBackendSettings {
    #[serde(default)]
    mode: Mode,
    path: Option<PathBuf>,
    executable: Option<String>,
    server_args: Option<Vec<String>>,
    format_args: Option<Vec<String>>,
    #[serde(default)]
    verbose: bool,
}

/// Which executable to run and how.
///
/// Invariant: `executable` is non-empty, and `path` is non-empty when present.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawBackendSettings")]
pub struct BackendSettings {
    mode: Mode,
    path: Option<PathBuf>,
    executable: String,
    server_args: Vec<String>,
    format_args: Vec<String>,
    verbose: bool,
}

impl TryFrom<RawBackendSettings> for BackendSettings {
    type Error = SettingsError;

    fn try_from(raw: RawBackendSettings) -> Result<Self, Self::Error> {
        let executable = raw
            .executable
            .unwrap_or_else(|| DEFAULT_EXECUTABLE.to_string());
        if executable.trim().is_empty() {
            return Err(SettingsError::EmptyExecutable);
        }
        if raw
            .path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err(SettingsError::EmptyPath);
        }
        Ok(Self {
            mode: raw.mode,
            path: raw.path,
            executable,
            server_args: raw.server_args.unwrap_or_else(default_server_args),
            format_args: raw.format_args.unwrap_or_else(default_format_args),
            verbose: raw.verbose,
        })
    }
}

fn default_server_args() -> Vec<String> {
    vec!["lsp".to_string()]
}

fn default_format_args() -> Vec<String> {
    vec!["fmt".to_string(), "--stdin".to_string()]
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            path: None,
            executable: DEFAULT_EXECUTABLE.to_string(),
            server_args: default_server_args(),
            format_args: default_format_args(),
            verbose: false,
        }
    }
}

impl BackendSettings {
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Explicitly configured executable path, if any. Requires trust approval.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn executable(&self) -> &str {
        &self.executable
    }

    #[must_use]
    pub fn server_args(&self) -> &[String] {
        &self.server_args
    }

    #[must_use]
    pub fn format_args(&self) -> &[String] {
        &self.format_args
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the explicit path. Empty paths are rejected like at parse time.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(SettingsError::EmptyPath);
        }
        self.path = Some(path);
        Ok(self)
    }
}

// ============================================================================
// [discovery]
// ============================================================================

#[derive(Deserialize)]
struct RawDiscoverySettings {
    config_file_names: Option<Vec<String>>,
    max_results: Option<usize>,
    max_depth: Option<usize>,
}

/// Bounds for the configuration-file search.
///
/// Invariant: at least one non-empty file name, and `max_results >= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawDiscoverySettings")]
pub struct DiscoverySettings {
    config_file_names: Vec<String>,
    max_results: usize,
    max_depth: usize,
}

impl TryFrom<RawDiscoverySettings> for DiscoverySettings {
    type Error = SettingsError;

    fn try_from(raw: RawDiscoverySettings) -> Result<Self, Self::Error> {
        let config_file_names: Vec<String> = match raw.config_file_names {
            Some(names) => names
                .into_iter()
                .filter(|n| !n.trim().is_empty())
                .collect(),
            None => default_config_file_names(),
        };
        if config_file_names.is_empty() {
            return Err(SettingsError::NoConfigFileNames);
        }
        let max_results = raw.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
        if max_results == 0 {
            return Err(SettingsError::ZeroMaxResults);
        }
        Ok(Self {
            config_file_names,
            max_results,
            max_depth: raw.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
        })
    }
}

fn default_config_file_names() -> Vec<String> {
    DEFAULT_CONFIG_FILE_NAMES
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            config_file_names: default_config_file_names(),
            max_results: DEFAULT_MAX_RESULTS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DiscoverySettings {
    #[must_use]
    pub fn config_file_names(&self) -> &[String] {
        &self.config_file_names
    }

    #[must_use]
    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Maximum descent below a scope root. `0` checks only the roots and their ancestors.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[must_use]
    pub fn is_config_file_name(&self, name: &str) -> bool {
        self.config_file_names.iter().any(|n| n == name)
    }
}

// ============================================================================
// [lifecycle]
// ============================================================================

#[derive(Deserialize)]
struct RawLifecycleSettings {
    debounce_ms: Option<u64>,
    stop_timeout_ms: Option<u64>,
    start_timeout_ms: Option<u64>,
    invoke_timeout_ms: Option<u64>,
}

/// Timing knobs for debounce and bounded external waits.
///
/// Invariant: every timeout is non-zero. A zero debounce is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawLifecycleSettings")]
pub struct LifecycleSettings {
    debounce: Duration,
    stop_timeout: Duration,
    start_timeout: Duration,
    invoke_timeout: Duration,
}

fn nonzero_ms(
    value: Option<u64>,
    default: u64,
    field: &'static str,
) -> Result<Duration, SettingsError> {
    match value.unwrap_or(default) {
        0 => Err(SettingsError::ZeroTimeout { field }),
        ms => Ok(Duration::from_millis(ms)),
    }
}

impl TryFrom<RawLifecycleSettings> for LifecycleSettings {
    type Error = SettingsError;

    fn try_from(raw: RawLifecycleSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            debounce: Duration::from_millis(raw.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)),
            stop_timeout: nonzero_ms(
                raw.stop_timeout_ms,
                DEFAULT_STOP_TIMEOUT_MS,
                "stop_timeout_ms",
            )?,
            start_timeout: nonzero_ms(
                raw.start_timeout_ms,
                DEFAULT_START_TIMEOUT_MS,
                "start_timeout_ms",
            )?,
            invoke_timeout: nonzero_ms(
                raw.invoke_timeout_ms,
                DEFAULT_INVOKE_TIMEOUT_MS,
                "invoke_timeout_ms",
            )?,
        })
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            stop_timeout: Duration::from_millis(DEFAULT_STOP_TIMEOUT_MS),
            start_timeout: Duration::from_millis(DEFAULT_START_TIMEOUT_MS),
            invoke_timeout: Duration::from_millis(DEFAULT_INVOKE_TIMEOUT_MS),
        }
    }
}

impl LifecycleSettings {
    /// Settle delay between the last trigger and a reinitialization run.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Bounded wait for a graceful stop before the handle is force-released.
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    #[must_use]
    pub fn start_timeout(&self) -> Duration {
        self.start_timeout
    }

    #[must_use]
    pub fn invoke_timeout(&self) -> Duration {
        self.invoke_timeout
    }
}
