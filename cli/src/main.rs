//! fmtlink - host process for a formatter backend.
//!
//! ```text
//! main() -> Lifecycle::start() ─┬─ file watcher ──┐
//!                               ├─ SIGHUP ────────┼─▶ trigger() ─▶ debounce ─▶ reinitialize()
//!                               └─ stdin commands ┘
//!        Ctrl-C / EOF / quit ─▶ Lifecycle::shutdown()
//! ```

mod commands;
mod watch;

use std::env;
use std::fs::{self, OpenOptions};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fmtlink_config::ConfigFile;
use fmtlink_core::{Lifecycle, SessionDeps, SettingsSource, TrustStore, WorkspaceFolders};
use fmtlink_types::DEFAULT_CONFIG_FILE_NAMES;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::commands::{HELP, HostCommand, ParseCommandError};
use crate::watch::{ConfigMatcher, ConfigWatcher};

#[derive(Debug, Parser)]
#[command(name = "fmtlink", version, about)]
struct Cli {
    /// Host configuration file [default: ~/.fmtlink/config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Trust store for explicit executable paths
    /// [default: ~/.fmtlink/trusted-executables.json]
    #[arg(long, global = true)]
    trust_store: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    log_stderr: bool,

    /// Default the log level to debug
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Keep the backend running for the given workspace folders (default)
    Run {
        /// Workspace folders [default: current directory]
        folders: Vec<PathBuf>,

        /// Ignore stdin; only Ctrl-C stops the host
        #[arg(long)]
        no_stdin: bool,
    },
    /// Approve an executable outside PATH
    Trust { path: PathBuf },
    /// Withdraw an approval
    Untrust { path: PathBuf },
    /// List approved executables
    Trusted,
}

fn init_tracing(verbose: bool, log_stderr: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    if log_stderr {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(std::io::stderr().is_terminal()),
            )
            .with(env_filter)
            .init();
        return;
    }

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No writable log location; stdout belongs to command output.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.fmtlink/logs/fmtlink.log
    if let Some(app_dir) = fmtlink_config::app_dir() {
        candidates.push(app_dir.join("logs").join("fmtlink.log"));
    }

    // Fallback: ./.fmtlink/logs/fmtlink.log
    candidates.push(PathBuf::from(".fmtlink").join("logs").join("fmtlink.log"));

    candidates
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_stderr);

    let trust_path = cli
        .trust_store
        .clone()
        .or_else(TrustStore::default_path)
        .context("no home directory; pass --trust-store")?;

    match cli.command {
        Some(Command::Trust { path }) => {
            let store = TrustStore::load(&trust_path)?;
            let path = absolute(&path)?;
            if !path.is_file() {
                anyhow::bail!("{} is not a file", path.display());
            }
            if store.approve(&path)? {
                println!("Trusted {}", path.display());
            } else {
                println!("Already trusted: {}", path.display());
            }
            Ok(())
        }
        Some(Command::Untrust { path }) => {
            let store = TrustStore::load(&trust_path)?;
            if store.revoke(&absolute(&path)?)? {
                println!("Revoked {}", path.display());
            } else {
                println!("Not trusted: {}", path.display());
            }
            Ok(())
        }
        Some(Command::Trusted) => {
            let store = TrustStore::load(&trust_path)?;
            for path in store.approved() {
                println!("{}", path.display());
            }
            Ok(())
        }
        Some(Command::Run { folders, no_stdin }) => {
            run(cli.config, trust_path, folders, no_stdin).await
        }
        None => run(cli.config, trust_path, Vec::new(), false).await,
    }
}

async fn run(
    config: Option<PathBuf>,
    trust_path: PathBuf,
    folders: Vec<PathBuf>,
    no_stdin: bool,
) -> Result<()> {
    // Watcher events carry absolute paths.
    let trust_path = absolute(&trust_path)?;
    let config_file = config
        .map(|path| absolute(&path))
        .transpose()?
        .map(ConfigFile::new)
        .or_else(ConfigFile::default_location)
        .unwrap_or_else(|| ConfigFile::new(PathBuf::from(".fmtlink").join("config.toml")));
    let trust = Arc::new(
        TrustStore::load(&trust_path)
            .with_context(|| format!("loading trust store {}", trust_path.display()))?,
    );

    let folders = if folders.is_empty() {
        vec![env::current_dir().context("reading current directory")?]
    } else {
        folders
            .iter()
            .map(|f| absolute(f))
            .collect::<Result<Vec<_>>>()?
    };

    let config_names = match SettingsSource::load(&config_file) {
        Ok(settings) => settings.discovery.config_file_names().to_vec(),
        Err(e) => {
            tracing::warn!("{e}");
            DEFAULT_CONFIG_FILE_NAMES
                .iter()
                .map(ToString::to_string)
                .collect()
        }
    };

    let workspace = WorkspaceFolders::new(folders.iter().cloned());
    let deps =
        SessionDeps::new(Arc::new(config_file.clone()), workspace).with_trust(Arc::clone(&trust));
    let lifecycle = Lifecycle::start(deps);

    let host_files = [config_file.path(), trust_path.as_path()];
    let mut watcher = ConfigMatcher::new(&config_names, &host_files)
        .and_then(|matcher| ConfigWatcher::new(lifecycle.trigger_source(), matcher))
        .map_err(|e| tracing::warn!("File watching disabled: {e:#}"))
        .ok();
    if let Some(watcher) = watcher.as_mut() {
        for folder in &folders {
            watcher.watch_root(folder);
        }
        watcher.watch_file(config_file.path());
        watcher.watch_file(&trust_path);
    }

    let mut hangup = Hangup::new()?;
    let mut lines = (!no_stdin).then(|| BufReader::new(tokio::io::stdin()).lines());

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!("Ctrl-C handler failed: {e}");
                }
                break;
            }
            () = hangup.recv() => {
                tracing::info!("SIGHUP received; reinitializing");
                lifecycle.restart();
            }
            line = next_line(lines.as_mut()) => match line {
                Ok(Some(line)) => {
                    if handle_line(&line, &lifecycle, watcher.as_mut()).await == Flow::Quit {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!("Reading stdin failed: {e}");
                    break;
                }
            },
        }
    }

    lifecycle.shutdown().await;
    Ok(())
}

type StdinLines = tokio::io::Lines<BufReader<tokio::io::Stdin>>;

async fn next_line(lines: Option<&mut StdinLines>) -> std::io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

async fn handle_line(
    line: &str,
    lifecycle: &Lifecycle,
    watcher: Option<&mut ConfigWatcher>,
) -> Flow {
    let command = match line.parse::<HostCommand>() {
        Ok(command) => command,
        Err(ParseCommandError::Empty) => return Flow::Continue,
        Err(e) => {
            eprintln!("{e}");
            return Flow::Continue;
        }
    };

    match command {
        HostCommand::Restart => lifecycle.restart(),
        HostCommand::Status => print_status(lifecycle),
        HostCommand::Add(dir) => match absolute(&dir) {
            Ok(dir) if lifecycle.add_workspace_folder(dir.clone()) => {
                if let Some(watcher) = watcher {
                    watcher.watch_root(&dir);
                }
                println!("Added {}", dir.display());
            }
            Ok(dir) => println!("Already a workspace folder: {}", dir.display()),
            Err(e) => eprintln!("{e:#}"),
        },
        HostCommand::Remove(dir) => match absolute(&dir) {
            Ok(dir) if lifecycle.remove_workspace_folder(&dir) => {
                if let Some(watcher) = watcher {
                    watcher.unwatch_root(&dir);
                }
                println!("Removed {}", dir.display());
            }
            Ok(dir) => println!("Not a workspace folder: {}", dir.display()),
            Err(e) => eprintln!("{e:#}"),
        },
        HostCommand::Format(file) => format_file(lifecycle, &file).await,
        HostCommand::Help => println!("{HELP}"),
        HostCommand::Quit => return Flow::Quit,
    }
    Flow::Continue
}

fn print_status(lifecycle: &Lifecycle) {
    let stats = lifecycle.stats();
    println!(
        "backend: {} | runs: {} started, {} failed",
        lifecycle.status(),
        stats.started,
        stats.failed
    );
    for folder in lifecycle.workspace_folders() {
        println!("  folder: {}", folder.display());
    }
    if lifecycle.mode_switched() {
        println!("  mode changed since start; restart fmtlink to apply it everywhere");
    }
}

async fn format_file(lifecycle: &Lifecycle, file: &Path) {
    let Some(invoker) = lifecycle.invoker().await else {
        eprintln!(
            "No Legacy backend available (backend: {}); server mode formats through the editor",
            lifecycle.status()
        );
        return;
    };

    let text = match tokio::fs::read_to_string(file).await {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read {}: {e}", file.display());
            return;
        }
    };

    match invoker.format(file, &text).await {
        Ok(formatted) => print!("{formatted}"),
        Err(e) => {
            tracing::warn!(path = %file.display(), "Formatting failed: {e}");
            eprintln!("Formatting failed: {e}");
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolving {}", path.display()))
}

/// SIGHUP as a restart request. Never fires off unix.
struct Hangup {
    #[cfg(unix)]
    signal: tokio::signal::unix::Signal,
}

impl Hangup {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        let signal = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
        Ok(Self { signal })
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        if self.signal.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}
