//! Approved executables outside the standard lookup path.
//!
//! An explicit `backend.path` may point anywhere, including into a freshly
//! cloned workspace. Such a path is only run after the user approved it with
//! `fmtlink trust <path>`. Approvals persist as JSON in the app directory.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use fmtlink_utils::{FileMode, atomic_write, ensure_private_dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const TRUST_FILE: &str = "trusted-executables.json";

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("failed to read trust store {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("trust store {} is corrupt: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write trust store {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrustFile {
    #[serde(default)]
    approved: BTreeSet<PathBuf>,
}

/// Set of approved executable paths, optionally backed by a file.
#[derive(Debug, Default)]
pub struct TrustStore {
    path: Option<PathBuf>,
    approved: RwLock<BTreeSet<PathBuf>>,
}

impl TrustStore {
    /// A store that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// `~/.fmtlink/trusted-executables.json`, if a home directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        fmtlink_config::app_dir().map(|dir| dir.join(TRUST_FILE))
    }

    /// Load approvals from `path`. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, TrustError> {
        let path = path.into();
        let approved = read_approved(&path)?;

        tracing::debug!(path = %path.display(), count = approved.len(), "Loaded trust store");
        Ok(Self {
            path: Some(path),
            approved: RwLock::new(approved),
        })
    }

    /// Re-read approvals from disk, picking up changes made by another
    /// process. On error the current approvals are kept. No-op in memory.
    pub fn reload(&self) -> Result<(), TrustError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let fresh = read_approved(path)?;
        let mut approved = self.approved.write().unwrap_or_else(PoisonError::into_inner);
        if *approved != fresh {
            tracing::debug!(path = %path.display(), count = fresh.len(), "Trust store changed on disk");
            *approved = fresh;
        }
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn is_trusted(&self, executable: &Path) -> bool {
        let key = normalize(executable);
        self.approved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
    }

    /// Approve `executable`. Returns `false` if it was already approved.
    pub fn approve(&self, executable: &Path) -> Result<bool, TrustError> {
        let key = normalize(executable);
        let mut approved = self.approved.write().unwrap_or_else(PoisonError::into_inner);
        if !approved.insert(key.clone()) {
            return Ok(false);
        }
        if let Err(e) = self.persist(&approved) {
            approved.remove(&key);
            return Err(e);
        }
        tracing::info!(path = %key.display(), "Approved formatter executable");
        Ok(true)
    }

    /// Withdraw approval. Returns `false` if `executable` was not approved.
    pub fn revoke(&self, executable: &Path) -> Result<bool, TrustError> {
        let key = normalize(executable);
        let mut approved = self.approved.write().unwrap_or_else(PoisonError::into_inner);
        if !approved.remove(&key) {
            return Ok(false);
        }
        if let Err(e) = self.persist(&approved) {
            approved.insert(key);
            return Err(e);
        }
        tracing::info!(path = %key.display(), "Revoked formatter executable");
        Ok(true)
    }

    #[must_use]
    pub fn approved(&self) -> Vec<PathBuf> {
        self.approved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn persist(&self, approved: &BTreeSet<PathBuf>) -> Result<(), TrustError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let write_err = |source| TrustError::Write {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            ensure_private_dir(parent).map_err(write_err)?;
        }
        let file = TrustFile {
            approved: approved.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| write_err(io::Error::other(e)))?;
        atomic_write(path, &json, FileMode::OwnerOnly).map_err(write_err)
    }
}

fn read_approved(path: &Path) -> Result<BTreeSet<PathBuf>, TrustError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let file: TrustFile =
                serde_json::from_str(&content).map_err(|source| TrustError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            Ok(file.approved)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(source) => Err(TrustError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Canonical form when the file exists, so symlinks and `..` can't dodge a
/// revocation. Falls back to the path as given.
fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
