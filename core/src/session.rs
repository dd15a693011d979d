//! Backend session state machine.
//!
//! ```text
//! Stopped ──reinitialize──▶ Starting ──▶ Running
//!    ▲                         │            │
//!    └──── no config / error ──┘            │ reinitialize / dispose
//!    └────────────── Stopping ◀─────────────┘
//! ```
//!
//! The handle lives inside the `Running` and `Stopping` variants, so it
//! exists exactly when the state says it does. A run always releases the
//! previous handle before starting, whatever the previous outcome was.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fmtlink_lsp::ClientOptions;
use fmtlink_types::{ConnectionError, Mode, SessionError, SessionState, SessionStatus, Settings};
use tokio::sync::watch;

use crate::backend::{BackendHandle, ClientFactory, LspClientFactory, server_args};
use crate::discovery::{ConfigDiscovery, FsConfigDiscovery};
use crate::invoker::Invoker;
use crate::resolver::{ExecutableResolver, FsExecutableResolver};
use crate::settings::SettingsSource;
use crate::trust::TrustStore;
use crate::workspace::WorkspaceFolders;

/// Everything a session consults during a run.
#[derive(Clone)]
pub struct SessionDeps {
    pub settings: Arc<dyn SettingsSource>,
    pub workspace: WorkspaceFolders,
    pub discovery: Arc<dyn ConfigDiscovery>,
    pub resolver: Arc<dyn ExecutableResolver>,
    pub trust: Arc<TrustStore>,
    pub clients: Arc<dyn ClientFactory>,
}

impl SessionDeps {
    /// Filesystem discovery, `PATH` resolution and the real language server,
    /// with an empty in-memory trust store.
    pub fn new(settings: Arc<dyn SettingsSource>, workspace: WorkspaceFolders) -> Self {
        Self {
            settings,
            workspace,
            discovery: Arc::new(FsConfigDiscovery),
            resolver: Arc::new(FsExecutableResolver),
            trust: Arc::new(TrustStore::in_memory()),
            clients: Arc::new(LspClientFactory),
        }
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn ConfigDiscovery>) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ExecutableResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_trust(mut self, trust: Arc<TrustStore>) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_clients(mut self, clients: Arc<dyn ClientFactory>) -> Self {
        self.clients = clients;
        self
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Running(Mode),
    /// No formatter configuration in scope; the session stays stopped.
    ConfigAbsent,
}

struct Active {
    handle: BackendHandle,
    stop_timeout: Duration,
}

enum Phase {
    Stopped,
    Starting,
    Running(Active),
    Stopping(Active),
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Self::Stopped => SessionState::Stopped,
            Self::Starting => SessionState::Starting,
            Self::Running(_) => SessionState::Running,
            Self::Stopping(_) => SessionState::Stopping,
        }
    }
}

/// Owner of the one live backend.
pub struct BackendSession {
    deps: SessionDeps,
    phase: Phase,
    /// Mode of the most recent run that got as far as reading settings.
    mode: Option<Mode>,
    status_tx: watch::Sender<SessionStatus>,
}

impl BackendSession {
    #[must_use]
    pub fn new(deps: SessionDeps) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::default());
        Self {
            deps,
            phase: Phase::Stopped,
            mode: None,
            status_tx,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.phase.state()
    }

    #[must_use]
    pub fn current_mode(&self) -> Option<Mode> {
        self.mode
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus::new(self.state(), self.mode)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    #[must_use]
    pub fn deps(&self) -> &SessionDeps {
        &self.deps
    }

    #[must_use]
    pub fn handle(&self) -> Option<&BackendHandle> {
        match &self.phase {
            Phase::Running(active) | Phase::Stopping(active) => Some(&active.handle),
            Phase::Stopped | Phase::Starting => None,
        }
    }

    /// The Legacy invoker, when the session is running in Legacy mode.
    #[must_use]
    pub fn invoker(&self) -> Option<&Invoker> {
        match self.handle() {
            Some(BackendHandle::Legacy(invoker)) => Some(invoker),
            _ => None,
        }
    }

    /// Tear down whatever is running and start over from current settings.
    ///
    /// Ends `Running` on success and `Stopped` otherwise. A missing
    /// configuration file is `Ok(ConfigAbsent)`, not an error.
    pub async fn reinitialize(&mut self) -> Result<StartOutcome, SessionError> {
        self.release().await;

        self.set_phase(Phase::Starting);
        match self.start().await {
            Ok(Some(active)) => {
                let mode = active.handle.mode();
                self.set_phase(Phase::Running(active));
                Ok(StartOutcome::Running(mode))
            }
            Ok(None) => {
                self.set_phase(Phase::Stopped);
                Ok(StartOutcome::ConfigAbsent)
            }
            Err(e) => {
                self.set_phase(Phase::Stopped);
                Err(e)
            }
        }
    }

    /// Release the backend. Safe from any state and when called repeatedly.
    pub async fn dispose(&mut self) {
        self.release().await;
    }

    async fn start(&mut self) -> Result<Option<Active>, SessionError> {
        let settings = match self.deps.settings.load() {
            Ok(settings) => settings,
            Err(e) => {
                self.mode = None;
                return Err(e.into());
            }
        };
        let mode = settings.backend.mode();
        self.mode = Some(mode);
        self.publish();

        let roots = self.deps.workspace.snapshot();
        if !self
            .deps
            .discovery
            .has_config_file(&roots, &settings.discovery)
            .await
        {
            tracing::info!("Configuration file not found.");
            return Ok(None);
        }

        reload_trust(&self.deps.trust).await;
        let cwd = working_dir(&roots);
        let executable = self
            .deps
            .resolver
            .resolve(&settings.backend, &self.deps.trust, &cwd)
            .await?;
        tracing::debug!(path = %executable.display(), %mode, "Resolved formatter executable");

        let handle = match mode {
            Mode::Server => {
                connect(self.deps.clients.as_ref(), executable, &settings, cwd, roots).await?
            }
            Mode::Legacy => BackendHandle::Legacy(Invoker::new(
                executable,
                settings.backend.format_args().to_vec(),
                cwd,
                settings.lifecycle.invoke_timeout(),
            )),
        };

        Ok(Some(Active {
            handle,
            stop_timeout: settings.lifecycle.stop_timeout(),
        }))
    }

    /// `Running → Stopping → Stopped`, bounded by the handle's stop timeout.
    async fn release(&mut self) {
        let active = match std::mem::replace(&mut self.phase, Phase::Stopped) {
            Phase::Running(active) | Phase::Stopping(active) => active,
            other => {
                self.phase = other;
                return;
            }
        };

        self.set_phase(Phase::Stopping(active));
        if let Phase::Stopping(active) = &mut self.phase {
            let timeout = active.stop_timeout;
            if tokio::time::timeout(timeout, active.handle.stop(timeout))
                .await
                .is_err()
            {
                tracing::debug!(
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Backend did not stop in time; forcing release"
                );
            }
            active.handle.dispose();
        }
        self.set_phase(Phase::Stopped);
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}

async fn connect(
    clients: &dyn ClientFactory,
    executable: PathBuf,
    settings: &Settings,
    cwd: PathBuf,
    roots: Vec<PathBuf>,
) -> Result<BackendHandle, SessionError> {
    let mut client = clients.create(ClientOptions {
        executable,
        args: server_args(&settings.backend),
        cwd,
        workspace_folders: roots,
        start_timeout: settings.lifecycle.start_timeout(),
    });

    let start_timeout = settings.lifecycle.start_timeout();
    let started = match tokio::time::timeout(start_timeout, client.start()).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::Timeout {
            timeout_ms: u64::try_from(start_timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    };

    if let Err(e) = started {
        // A half-started client must not outlive the failed run.
        client.dispose();
        return Err(e.into());
    }
    Ok(BackendHandle::Server(client))
}

/// Pick up approvals granted since the last run, e.g. by `fmtlink trust`
/// from another process.
async fn reload_trust(trust: &Arc<TrustStore>) {
    if trust.path().is_none() {
        return;
    }
    let trust = Arc::clone(trust);
    match tokio::task::spawn_blocking(move || trust.reload()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Keeping previous executable approvals: {e}"),
        Err(e) => tracing::warn!("Trust store reload task failed: {e}"),
    }
}

fn working_dir(roots: &[PathBuf]) -> PathBuf {
    roots
        .first()
        .cloned()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Drop for BackendSession {
    fn drop(&mut self) {
        if let Phase::Running(active) | Phase::Stopping(active) = &mut self.phase {
            active.handle.dispose();
        }
    }
}
