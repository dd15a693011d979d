//! Protocol client: owns the formatter child process and its stdio tasks.
//!
//! A client is built idle and connects in [`LspClient::start`]. It stays
//! connected until [`LspClient::stop`] (graceful, bounded) or
//! [`LspClient::dispose`] (immediate). Dropping a connection kills the child.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fmtlink_types::ConnectionError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::codec::{FrameReader, FrameWriter};
use crate::protocol::{self, Incoming, Notification, Request};

const WRITER_CHANNEL_CAPACITY: usize = 64;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>;

enum WriterCommand {
    Send(serde_json::Value),
    Close,
}

/// How to launch and greet the formatter's language server.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Working directory of the child; also the `rootUri` sent on initialize.
    pub cwd: PathBuf,
    pub workspace_folders: Vec<PathBuf>,
    /// Bound on spawn + `initialize` round trip.
    pub start_timeout: Duration,
}

struct Connection {
    child: Child,
    writer_tx: mpsc::Sender<WriterCommand>,
    pending: PendingMap,
    next_id: u64,
    alive: Arc<AtomicBool>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
    stderr_handle: Option<JoinHandle<()>>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
        if let Some(handle) = &self.stderr_handle {
            handle.abort();
        }
        let _ = self.child.start_kill();
    }
}

impl Connection {
    async fn request(
        &mut self,
        method: &'static str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value, ConnectionError> {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = serde_json::to_value(Request::new(id, method, params))
            .map_err(|e| ConnectionError::Handshake(format!("serializing {method}: {e}")))?;
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(ConnectionError::Closed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(_)) => Err(ConnectionError::Closed),
            Err(_) => {
                // Keep the pending map from growing across repeated timeouts.
                self.pending.lock().await.remove(&id);
                Err(ConnectionError::Timeout {
                    timeout_ms: duration_ms(timeout),
                })
            }
        }
    }

    async fn notify(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<(), ConnectionError> {
        let frame = serde_json::to_value(Notification::new(method, params))
            .map_err(|e| ConnectionError::Handshake(format!("serializing {method}: {e}")))?;
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| ConnectionError::Closed)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Persistent connection to `<executable> <args>` speaking JSON-RPC on stdio.
pub struct LspClient {
    options: ClientOptions,
    connection: Option<Connection>,
}

impl LspClient {
    /// Build an idle client. Nothing is spawned until [`LspClient::start`].
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            connection: None,
        }
    }

    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Whether a connection exists and its reader has not seen EOF.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.alive.load(Ordering::Acquire))
    }

    /// Spawn the server and complete the `initialize` handshake.
    ///
    /// On failure the child is killed before returning; no connection is kept.
    pub async fn start(&mut self) -> Result<(), ConnectionError> {
        if self.connection.is_some() {
            tracing::debug!("Protocol client already connected; start ignored");
            return Ok(());
        }

        let deadline = Instant::now() + self.options.start_timeout;
        let mut connection = self.spawn()?;

        let params =
            protocol::initialize_params(&self.options.cwd, &self.options.workspace_folders);
        let remaining = deadline.saturating_duration_since(Instant::now());
        let response = connection
            .request("initialize", Some(params), remaining)
            .await?;
        if let Some(message) = protocol::response_error(&response) {
            return Err(ConnectionError::Handshake(message));
        }
        connection
            .notify("initialized", Some(serde_json::json!({})))
            .await?;

        tracing::info!(
            executable = %self.options.executable.display(),
            pid = ?connection.child.id(),
            "Formatter server connected"
        );
        self.connection = Some(connection);
        Ok(())
    }

    fn spawn(&self) -> Result<Connection, ConnectionError> {
        let opts = &self.options;
        let mut child = Command::new(&opts.executable)
            .args(&opts.args)
            .current_dir(&opts.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConnectionError::Spawn {
                command: opts.executable.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.start_kill();
            return Err(ConnectionError::Handshake(
                "formatter stdio was not piped".to_string(),
            ));
        };

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);

        let writer_handle = tokio::spawn(async move {
            let mut writer = FrameWriter::new(stdin);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!("Formatter write error: {e:#}");
                            break;
                        }
                    }
                    WriterCommand::Close => break,
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_writer_tx = writer_tx.clone();
        let reader_alive = alive.clone();
        let reader_handle = tokio::spawn(async move {
            let mut reader = FrameReader::new(stdout);
            loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => {
                        Self::dispatch_frame(&frame, &reader_pending, &reader_writer_tx).await;
                    }
                    Ok(None) => {
                        tracing::info!("Formatter server closed stdout");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Formatter reader error: {e:#}");
                        break;
                    }
                }
            }
            reader_alive.store(false, Ordering::Release);
            // Wake anyone still waiting on a response.
            reader_pending.lock().await.clear();
        });

        let stderr_handle = child.stderr.take().map(forward_stderr);

        Ok(Connection {
            child,
            writer_tx,
            pending,
            next_id: 1,
            alive,
            reader_handle,
            writer_handle,
            stderr_handle,
        })
    }

    async fn dispatch_frame(
        frame: &serde_json::Value,
        pending: &Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
        writer_tx: &mpsc::Sender<WriterCommand>,
    ) {
        let Some(incoming) = Incoming::classify(frame) else {
            tracing::trace!("Ignoring malformed JSON-RPC frame from formatter");
            return;
        };

        match incoming {
            Incoming::Response { id, body } => {
                let sender = pending.lock().await.remove(&id);
                if let Some(tx) = sender {
                    let _ = tx.send(body);
                }
            }
            Incoming::ServerRequest { id, method, params } => {
                tracing::debug!("Formatter sent request: {method}");
                let reply = protocol::reply_to_server_request(&id, &method, params.as_ref());
                let _ = writer_tx.send(WriterCommand::Send(reply)).await;
            }
            Incoming::Notification { method, params } => match (method.as_str(), params) {
                ("window/logMessage" | "window/showMessage", Some(params)) => {
                    let message = params
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or_default();
                    tracing::debug!(
                        level = protocol::log_message_level(&params),
                        "formatter: {message}"
                    );
                }
                (method, _) => tracing::trace!("Ignoring notification from formatter: {method}"),
            },
        }
    }

    /// Graceful disconnect: `shutdown`, `exit`, then wait for the child.
    ///
    /// Best-effort and bounded by `timeout`; whatever is still running when
    /// the budget runs out is killed. Never fails.
    pub async fn stop(&mut self, timeout: Duration) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        let deadline = Instant::now() + timeout;

        if connection.alive.load(Ordering::Acquire) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match connection.request("shutdown", None, remaining).await {
                Ok(response) if protocol::response_error(&response).is_none() => {
                    let _ = connection.notify("exit", None).await;
                }
                Ok(response) => tracing::debug!(
                    "Formatter rejected shutdown: {}",
                    protocol::response_error(&response).unwrap_or_default()
                ),
                Err(e) => tracing::debug!("Formatter shutdown request failed: {e}"),
            }
        }

        let _ = connection.writer_tx.send(WriterCommand::Close).await;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if tokio::time::timeout(remaining, connection.child.wait())
            .await
            .is_err()
        {
            tracing::debug!("Formatter didn't exit in time, killing");
            let _ = connection.child.kill().await;
        }
        // Drop aborts the IO tasks.
    }

    /// Immediate disconnect. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::debug!(pid = ?connection.child.id(), "Disposing formatter connection");
            drop(connection);
        }
    }
}

fn forward_stderr(stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "fmtlink::formatter", "{line}");
        }
    })
}
