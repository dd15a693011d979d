//! Host-facing start and shutdown.

use std::path::{Path, PathBuf};

use fmtlink_types::{LifecycleSettings, Mode, SessionStatus};
use tokio::sync::watch;

use crate::controller::{ReinitController, ReinitTrigger, RunStats};
use crate::invoker::Invoker;
use crate::session::{BackendSession, SessionDeps};
use crate::workspace::WorkspaceFolders;

/// One activation cycle: created by [`Lifecycle::start`], ended by
/// [`Lifecycle::shutdown`].
pub struct Lifecycle {
    controller: ReinitController,
    workspace: WorkspaceFolders,
}

impl Lifecycle {
    /// Build the session, start the controller and request the first run.
    ///
    /// The debounce delay is read once here; other settings are re-read by
    /// every run.
    #[must_use]
    pub fn start(deps: SessionDeps) -> Self {
        let lifecycle = deps.settings.load().map_or_else(
            |e| {
                tracing::warn!("Using default timings: {e}");
                LifecycleSettings::default()
            },
            |settings| settings.lifecycle,
        );

        let workspace = deps.workspace.clone();
        tracing::info!(
            folders = workspace.snapshot().len(),
            debounce_ms = u64::try_from(lifecycle.debounce().as_millis()).unwrap_or(u64::MAX),
            "Starting formatter lifecycle"
        );

        let controller = ReinitController::spawn(BackendSession::new(deps), lifecycle.debounce());
        controller.trigger();
        Self {
            controller,
            workspace,
        }
    }

    /// Handle for an independent trigger source (watcher, signal, command).
    #[must_use]
    pub fn trigger_source(&self) -> ReinitTrigger {
        self.controller.trigger_handle()
    }

    pub fn restart(&self) {
        self.controller.trigger();
    }

    /// Add a workspace folder and schedule a run. Returns `false` if it was
    /// already present.
    pub fn add_workspace_folder(&self, folder: PathBuf) -> bool {
        let added = self.workspace.add(folder);
        if added {
            self.controller.trigger();
        }
        added
    }

    /// Remove a workspace folder and schedule a run. Returns `false` if it
    /// was not present.
    pub fn remove_workspace_folder(&self, folder: &Path) -> bool {
        let removed = self.workspace.remove(folder);
        if removed {
            self.controller.trigger();
        }
        removed
    }

    #[must_use]
    pub fn workspace_folders(&self) -> Vec<PathBuf> {
        self.workspace.snapshot()
    }

    #[must_use]
    pub fn current_mode(&self) -> Option<Mode> {
        self.controller.current_mode()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.controller.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.controller.subscribe_status()
    }

    #[must_use]
    pub fn stats(&self) -> RunStats {
        self.controller.stats()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<RunStats> {
        self.controller.subscribe_stats()
    }

    /// Whether any run so far switched between Legacy and Server. The host
    /// should offer a reload when this turns true.
    #[must_use]
    pub fn mode_switched(&self) -> bool {
        self.controller.stats().mode_switches > 0
    }

    pub async fn invoker(&self) -> Option<Invoker> {
        self.controller.invoker().await
    }

    /// Full teardown. Waits for an in-flight run, then releases the backend.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down formatter lifecycle");
        self.controller.shutdown().await;
    }
}
