//! Debounced, single-flight reinitialization.
//!
//! The controller runs as one task that owns the [`BackendSession`]. A
//! trigger arms (or re-arms) a settle timer; when it fires, the session is
//! moved into a run future and reinitialized. Triggers that arrive while a
//! run is in flight only mark it dirty, and a dirty run re-arms the timer
//! once when it finishes. However many triggers a burst holds, it costs at
//! most the run in flight plus one more.

use std::future::{self, Future};
use std::pin::Pin;
use std::time::Duration;

use fmtlink_types::{Mode, SessionStatus};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::invoker::Invoker;
use crate::session::{BackendSession, StartOutcome};

enum Command {
    Trigger,
    Invoker(oneshot::Sender<Option<Invoker>>),
    Shutdown,
}

/// Counters published after every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    /// Runs whose mode differed from the run before.
    pub mode_switches: u64,
}

impl RunStats {
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.started > self.completed
    }
}

/// `running` / `pending` / timer bookkeeping.
///
/// `pending` is only ever set while `running`, and is cleared in the same
/// step that re-arms the timer. Arming replaces any earlier deadline, so
/// there is never more than one.
#[derive(Debug, Default)]
struct ReinitState {
    running: bool,
    pending: bool,
    deadline: Option<Instant>,
}

impl ReinitState {
    fn trigger(&mut self, now: Instant, debounce: Duration) {
        if self.running {
            self.pending = true;
        } else {
            self.deadline = Some(now + debounce);
        }
    }

    /// The timer fired. Returns whether a run should start.
    fn fire(&mut self) -> bool {
        self.deadline = None;
        if self.running {
            return false;
        }
        self.running = true;
        true
    }

    /// A run finished, successfully or not.
    fn complete(&mut self, now: Instant, debounce: Duration) {
        self.running = false;
        if std::mem::take(&mut self.pending) {
            self.deadline = Some(now + debounce);
        }
    }

    fn cancel(&mut self) {
        self.deadline = None;
        self.pending = false;
    }
}

/// Cheap, cloneable handle for trigger sources.
#[derive(Clone)]
pub struct ReinitTrigger {
    tx: mpsc::UnboundedSender<Command>,
}

impl ReinitTrigger {
    /// Request a reinitialization. Never blocks; a no-op after shutdown.
    pub fn trigger(&self) {
        if self.tx.send(Command::Trigger).is_err() {
            tracing::trace!("Reinitialization requested after shutdown; ignored");
        }
    }
}

pub struct ReinitController {
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
    stats: watch::Receiver<RunStats>,
    task: JoinHandle<()>,
}

impl ReinitController {
    /// Take ownership of `session` and start the controller task.
    ///
    /// Nothing runs until the first trigger.
    #[must_use]
    pub fn spawn(session: BackendSession, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stats_tx, stats) = watch::channel(RunStats::default());
        let status = session.subscribe();

        let actor = Actor {
            rx,
            debounce,
            state: ReinitState::default(),
            session: Some(session),
            stats_tx,
        };
        let task = tokio::spawn(actor.run());

        Self {
            tx,
            status,
            stats,
            task,
        }
    }

    pub fn trigger(&self) {
        self.trigger_handle().trigger();
    }

    #[must_use]
    pub fn trigger_handle(&self) -> ReinitTrigger {
        ReinitTrigger {
            tx: self.tx.clone(),
        }
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Mode of the most recent run, `None` before the first one.
    #[must_use]
    pub fn current_mode(&self) -> Option<Mode> {
        self.status.borrow().mode
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    #[must_use]
    pub fn stats(&self) -> RunStats {
        *self.stats.borrow()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<RunStats> {
        self.stats.clone()
    }

    /// The Legacy invoker, if the session is idle and running in Legacy mode.
    pub async fn invoker(&self) -> Option<Invoker> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Invoker(reply)).ok()?;
        rx.await.ok().flatten()
    }

    /// Cancel any armed timer, let an in-flight run finish, then dispose the
    /// session.
    pub async fn shutdown(self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!("Reinitialization task ended abnormally: {e}");
        }
    }
}

type RunFuture = Pin<Box<dyn Future<Output = (BackendSession, RunReport)> + Send>>;

struct RunReport {
    failed: bool,
    mode_switched: bool,
}

struct Actor {
    rx: mpsc::UnboundedReceiver<Command>,
    debounce: Duration,
    state: ReinitState,
    /// `None` exactly while a run holds the session.
    session: Option<BackendSession>,
    stats_tx: watch::Sender<RunStats>,
}

impl Actor {
    async fn run(mut self) {
        let mut in_flight: Option<RunFuture> = None;
        let mut shutting_down = false;

        loop {
            tokio::select! {
                biased;

                (session, report) = wait_run(&mut in_flight) => {
                    in_flight = None;
                    self.session = Some(session);
                    self.state.complete(Instant::now(), self.debounce);
                    self.stats_tx.send_modify(|stats| {
                        stats.completed += 1;
                        stats.failed += u64::from(report.failed);
                        stats.mode_switches += u64::from(report.mode_switched);
                    });
                    if shutting_down {
                        break;
                    }
                }

                command = self.rx.recv(), if !shutting_down => match command {
                    Some(Command::Trigger) => self.state.trigger(Instant::now(), self.debounce),
                    Some(Command::Invoker(reply)) => {
                        let invoker = self.session.as_ref().and_then(|s| s.invoker().cloned());
                        let _ = reply.send(invoker);
                    }
                    Some(Command::Shutdown) | None => {
                        self.state.cancel();
                        if in_flight.is_none() {
                            break;
                        }
                        tracing::debug!("Waiting for in-flight reinitialization before shutdown");
                        shutting_down = true;
                    }
                },

                () = wait_deadline(self.state.deadline) => {
                    if self.state.fire()
                        && let Some(session) = self.session.take()
                    {
                        self.stats_tx.send_modify(|stats| stats.started += 1);
                        in_flight = Some(Box::pin(run_once(session)));
                    }
                }
            }
        }

        if let Some(mut session) = self.session.take() {
            session.dispose().await;
        }
        tracing::debug!("Reinitialization controller stopped");
    }
}

async fn wait_run(in_flight: &mut Option<RunFuture>) -> (BackendSession, RunReport) {
    match in_flight {
        Some(run) => run.await,
        None => future::pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

/// One reinitialization. Failures end here as log lines.
async fn run_once(mut session: BackendSession) -> (BackendSession, RunReport) {
    let previous = session.current_mode();
    let failed = match session.reinitialize().await {
        Ok(StartOutcome::Running(mode)) => {
            tracing::info!(%mode, "Formatter backend ready");
            false
        }
        Ok(StartOutcome::ConfigAbsent) => false,
        Err(e) => {
            tracing::error!(kind = e.kind(), "Reinitialization failed: {e}");
            true
        }
    };

    let mode_switched = match (previous, session.current_mode()) {
        (Some(from), Some(to)) if from != to => {
            tracing::warn!(
                %from,
                %to,
                "Formatter mode changed; reload the host for the new mode to take full effect"
            );
            true
        }
        _ => false,
    };

    (
        session,
        RunReport {
            failed,
            mode_switched,
        },
    )
}
