//! Core domain types for fmtlink.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! The lifecycle crates share the backend [`Mode`], the observable [`SessionState`],
//! validated settings, and the error taxonomy defined here.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod error;
mod settings;

pub use error::{ConnectionError, InvokeError, ResolveError, SessionError, SettingsError};
pub use settings::{
    BackendSettings, DEFAULT_CONFIG_FILE_NAMES, DEFAULT_EXECUTABLE, DiscoverySettings,
    LifecycleSettings, Settings,
};

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Backend mode
// ============================================================================

/// How the formatter backend is reached.
///
/// Recomputed from settings on every reinitialization. Switching variants
/// always tears the previous handle down before the new one is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One formatter process per request; nothing persistent is held.
    Legacy,
    /// A long-lived protocol client connected to `<exe> lsp`.
    #[default]
    Server,
}

impl Mode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Server => "server",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Session state
// ============================================================================

/// Observable state of a backend session.
///
/// A connection handle exists iff the state is `Running` or `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl SessionState {
    /// Whether a session in this state owns a connection handle.
    #[must_use]
    pub const fn has_handle(self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published after every state transition.
///
/// `mode` is the mode computed by the most recent reinitialization, or `None`
/// before the first run (and after a run that could not load settings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub state: SessionState,
    pub mode: Option<Mode>,
}

impl SessionStatus {
    #[must_use]
    pub const fn new(state: SessionState, mode: Option<Mode>) -> Self {
        Self { state, mode }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Some(mode) => write!(f, "{} ({mode})", self.state),
            None => write!(f, "{}", self.state),
        }
    }
}
