//! Legacy mode: one formatter process per request.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use fmtlink_types::InvokeError;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Stateless handle for Legacy mode.
///
/// Holds the resolved executable and how to call it; nothing is spawned
/// until [`Invoker::format`]. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoker {
    executable: PathBuf,
    args: Vec<String>,
    cwd: PathBuf,
    timeout: Duration,
}

impl Invoker {
    #[must_use]
    pub fn new(executable: PathBuf, args: Vec<String>, cwd: PathBuf, timeout: Duration) -> Self {
        Self {
            executable,
            args,
            cwd,
            timeout,
        }
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run `<executable> <args> <file_path>` with `text` on stdin and return
    /// its stdout.
    pub async fn format(&self, file_path: &Path, text: &str) -> Result<String, InvokeError> {
        let mut child = Command::new(&self.executable)
            .args(&self.args)
            .arg(file_path)
            .current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InvokeError::Spawn {
                command: self.executable.clone(),
                source,
            })?;

        // Feed stdin alongside the wait so a chatty formatter can't deadlock
        // against a full stdout pipe. Both are dropped together on timeout.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin
                && let Err(e) = stdin.write_all(text.as_bytes()).await
            {
                tracing::debug!("Formatter closed stdin early: {e}");
            }
        };
        let run = async move {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        // On timeout the child is dropped, and kill_on_drop reaps it.
        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| InvokeError::Timeout { timeout_ms })??;

        if !output.status.success() {
            return Err(InvokeError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| InvokeError::NonUtf8Output)
    }
}
