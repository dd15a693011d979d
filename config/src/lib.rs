//! Host configuration for fmtlink.
//!
//! The configuration lives at `~/.fmtlink/config.toml`. Every section is
//! optional; a missing file means defaults. The file is re-read on every
//! reinitialization, so edits take effect on the next run.
//!
//! ```toml
//! [backend]
//! mode = "server"
//! path = "${HOME}/.local/bin/dprint"
//!
//! [lifecycle]
//! debounce_ms = 250
//! stop_timeout_ms = 2000
//! ```

use std::env;
use std::path::{Path, PathBuf};

use fmtlink_types::{Settings, SettingsError};
use thiserror::Error;

const APP_DIR: &str = ".fmtlink";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value in {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        source: SettingsError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path,
        }
    }
}

impl From<ConfigError> for SettingsError {
    fn from(err: ConfigError) -> Self {
        SettingsError::Load {
            source_name: err.path().display().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Per-user state directory (`~/.fmtlink`).
#[must_use]
pub fn app_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_DIR))
}

/// Default configuration file location.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    app_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Replace `${VAR}` references with environment values. Unset variables
/// become empty; an unclosed `${` is kept verbatim.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// A configuration file on disk, read fresh on every [`ConfigFile::load`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file at [`config_path`], if a home directory is known.
    #[must_use]
    pub fn default_location() -> Option<Self> {
        config_path().map(Self::new)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the file. A missing file yields default settings.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let path = &self.path;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file; using defaults");
            return Ok(Settings::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {:?}: {}", path, source);
            ConfigError::Read {
                path: path.clone(),
                source,
            }
        })?;

        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Settings, ConfigError> {
        let mut settings: Settings = toml::from_str(content).map_err(|source| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, source);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;

        if let Some(raw) = settings.backend.path() {
            let expanded = expand_env_vars(&raw.to_string_lossy());
            settings.backend = settings
                .backend
                .with_path(expanded)
                .map_err(|source| ConfigError::Invalid {
                    path: path.to_path_buf(),
                    source,
                })?;
        }

        Ok(settings)
    }
}
