//! The set of workspace folders that scope discovery and the server.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Shared, ordered list of workspace roots. Clones observe the same list.
///
/// The first folder doubles as the working directory for the formatter.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceFolders {
    inner: Arc<RwLock<Vec<PathBuf>>>,
}

impl WorkspaceFolders {
    #[must_use]
    pub fn new(folders: impl IntoIterator<Item = PathBuf>) -> Self {
        let this = Self::default();
        for folder in folders {
            this.add(folder);
        }
        this
    }

    /// Returns `false` when the folder was already present.
    pub fn add(&self, folder: PathBuf) -> bool {
        let mut folders = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if folders.contains(&folder) {
            return false;
        }
        folders.push(folder);
        true
    }

    /// Returns `false` when the folder was not present.
    pub fn remove(&self, folder: &Path) -> bool {
        let mut folders = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = folders.len();
        folders.retain(|f| f != folder);
        folders.len() != before
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn primary(&self) -> Option<PathBuf> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .first()
            .cloned()
    }
}
