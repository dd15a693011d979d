//! The two backend variants and the seam for the persistent client.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use fmtlink_lsp::{ClientOptions, LspClient};
use fmtlink_types::{BackendSettings, ConnectionError, Mode};

use crate::invoker::Invoker;

/// Boxed future returned by the object-safe collaborator traits.
pub type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistent connection to a formatter running in server mode.
///
/// `stop` is best-effort and must not fail; `dispose` releases whatever is
/// left immediately and must be safe to call more than once.
pub trait ProtocolClient: Send {
    fn start(&mut self) -> BoxFut<'_, Result<(), ConnectionError>>;

    fn stop(&mut self, timeout: Duration) -> BoxFut<'_, ()>;

    fn dispose(&mut self);
}

/// Builds idle protocol clients; the session calls `start` on the result.
pub trait ClientFactory: Send + Sync {
    fn create(&self, options: ClientOptions) -> Box<dyn ProtocolClient>;
}

impl ProtocolClient for LspClient {
    fn start(&mut self) -> BoxFut<'_, Result<(), ConnectionError>> {
        Box::pin(LspClient::start(self))
    }

    fn stop(&mut self, timeout: Duration) -> BoxFut<'_, ()> {
        Box::pin(LspClient::stop(self, timeout))
    }

    fn dispose(&mut self) {
        LspClient::dispose(self);
    }
}

/// Spawns the real formatter language server over stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct LspClientFactory;

impl ClientFactory for LspClientFactory {
    fn create(&self, options: ClientOptions) -> Box<dyn ProtocolClient> {
        Box::new(LspClient::new(options))
    }
}

/// Arguments for server mode, with `--verbose` appended when requested.
#[must_use]
pub fn server_args(settings: &BackendSettings) -> Vec<String> {
    let mut args = settings.server_args().to_vec();
    if settings.verbose() && !args.iter().any(|a| a == "--verbose") {
        args.push("--verbose".to_string());
    }
    args
}

/// The live backend owned by a running session.
pub enum BackendHandle {
    Server(Box<dyn ProtocolClient>),
    Legacy(Invoker),
}

impl BackendHandle {
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self {
            Self::Server(_) => Mode::Server,
            Self::Legacy(_) => Mode::Legacy,
        }
    }

    pub(crate) async fn stop(&mut self, timeout: Duration) {
        match self {
            Self::Server(client) => client.stop(timeout).await,
            // Nothing persistent to wind down.
            Self::Legacy(_) => {}
        }
    }

    pub(crate) fn dispose(&mut self) {
        if let Self::Server(client) = self {
            client.dispose();
        }
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(_) => f.write_str("BackendHandle::Server"),
            Self::Legacy(invoker) => f.debug_tuple("BackendHandle::Legacy").field(invoker).finish(),
        }
    }
}
