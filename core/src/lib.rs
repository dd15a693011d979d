//! Formatter backend lifecycle.
//!
//! A [`BackendSession`] owns at most one live backend (a persistent
//! protocol client or a per-call invoker). A [`ReinitController`] serializes
//! and debounces requests to rebuild it, and [`Lifecycle`] wires both to the
//! host's start and shutdown.
//!
//! External collaborators sit behind traits so the lifecycle can run
//! against the filesystem or against fakes:
//! [`SettingsSource`], [`ConfigDiscovery`], [`ExecutableResolver`] and
//! [`ClientFactory`].

mod backend;
mod controller;
pub mod discovery;
mod invoker;
mod lifecycle;
pub mod resolver;
mod session;
mod settings;
pub mod trust;
mod workspace;

pub use backend::{
    BackendHandle, BoxFut, ClientFactory, LspClientFactory, ProtocolClient, server_args,
};
pub use controller::{ReinitController, ReinitTrigger, RunStats};
pub use discovery::{ConfigDiscovery, FsConfigDiscovery};
pub use invoker::Invoker;
pub use lifecycle::Lifecycle;
pub use resolver::{ExecutableResolver, FsExecutableResolver};
pub use session::{BackendSession, SessionDeps, StartOutcome};
pub use settings::{InMemorySettings, SettingsSource};
pub use trust::{TrustError, TrustStore};
pub use workspace::WorkspaceFolders;

pub use fmtlink_lsp::ClientOptions;
pub use fmtlink_types::{Mode, SessionState, SessionStatus};
