//! Turning backend settings into an absolute, runnable executable path.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fmtlink_types::{BackendSettings, ResolveError};

use crate::backend::BoxFut;
use crate::trust::TrustStore;

pub trait ExecutableResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        settings: &'a BackendSettings,
        trust: &'a Arc<TrustStore>,
        cwd: &'a Path,
    ) -> BoxFut<'a, Result<PathBuf, ResolveError>>;
}

/// Resolves against the filesystem and `PATH`.
///
/// An explicit location (`backend.path`, or an `executable` containing a
/// path separator) must exist, be a regular file and be approved in the
/// trust store. A bare name is looked up on `PATH` and needs no approval.
/// Runs on a blocking thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsExecutableResolver;

impl ExecutableResolver for FsExecutableResolver {
    fn resolve<'a>(
        &'a self,
        settings: &'a BackendSettings,
        trust: &'a Arc<TrustStore>,
        cwd: &'a Path,
    ) -> BoxFut<'a, Result<PathBuf, ResolveError>> {
        let settings = settings.clone();
        let trust = Arc::clone(trust);
        let cwd = cwd.to_path_buf();
        Box::pin(async move {
            let target = settings.executable().to_string();
            match tokio::task::spawn_blocking(move || resolve_executable(&settings, &trust, &cwd))
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("Executable resolution task failed: {e}");
                    Err(ResolveError::NotFound { target })
                }
            }
        })
    }
}

pub fn resolve_executable(
    settings: &BackendSettings,
    trust: &TrustStore,
    cwd: &Path,
) -> Result<PathBuf, ResolveError> {
    if let Some(path) = settings.path() {
        return resolve_explicit(path, trust, cwd);
    }

    let name = settings.executable();
    if has_separator(name) {
        return resolve_explicit(Path::new(name), trust, cwd);
    }

    let found = which::which_in(name, env::var_os("PATH"), cwd).map_err(|e| {
        tracing::debug!("PATH lookup for {name} failed: {e}");
        ResolveError::NotFound {
            target: name.to_string(),
        }
    })?;
    canonical(&found)
}

fn resolve_explicit(path: &Path, trust: &TrustStore, cwd: &Path) -> Result<PathBuf, ResolveError> {
    let candidate = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let metadata = match fs::metadata(&candidate) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ResolveError::NotFound {
                target: candidate.display().to_string(),
            });
        }
        Err(e) => {
            return Err(ResolveError::InvalidPath {
                path: candidate,
                reason: e.to_string(),
            });
        }
    };

    if !metadata.is_file() {
        return Err(ResolveError::InvalidPath {
            path: candidate,
            reason: "not a regular file".to_string(),
        });
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ResolveError::InvalidPath {
                path: candidate,
                reason: "not executable".to_string(),
            });
        }
    }

    let resolved = canonical(&candidate)?;
    if !trust.is_trusted(&resolved) {
        return Err(ResolveError::Untrusted { path: resolved });
    }
    Ok(resolved)
}

fn canonical(path: &Path) -> Result<PathBuf, ResolveError> {
    fs::canonicalize(path).map_err(|e| ResolveError::InvalidPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn has_separator(name: &str) -> bool {
    name.contains('/') || (cfg!(windows) && name.contains('\\'))
}
