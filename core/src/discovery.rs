//! Formatter configuration file discovery.
//!
//! A scope root counts as configured when the root itself, one of its
//! ancestors, or a descendant within `max_depth` holds a file whose name is
//! in `config_file_names`. Absence is a normal answer, never an error.

use std::path::{Path, PathBuf};

use fmtlink_types::DiscoverySettings;
use ignore::WalkBuilder;

use crate::backend::BoxFut;

/// Directories never worth descending into when looking for config files.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target"];

pub trait ConfigDiscovery: Send + Sync {
    /// Whether any scope root (or an ancestor, or a descendant) holds a
    /// formatter configuration file.
    fn has_config_file<'a>(
        &'a self,
        roots: &'a [PathBuf],
        settings: &'a DiscoverySettings,
    ) -> BoxFut<'a, bool>;
}

/// Discovery against the real filesystem, run on a blocking thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsConfigDiscovery;

impl ConfigDiscovery for FsConfigDiscovery {
    fn has_config_file<'a>(
        &'a self,
        roots: &'a [PathBuf],
        settings: &'a DiscoverySettings,
    ) -> BoxFut<'a, bool> {
        let roots = roots.to_vec();
        let settings = settings.clone();
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || find_config_files(&roots, &settings)).await
            {
                Ok(found) => {
                    if let Some(first) = found.first() {
                        tracing::debug!(path = %first.display(), "Found formatter configuration");
                    }
                    !found.is_empty()
                }
                Err(e) => {
                    tracing::warn!("Config discovery task failed: {e}");
                    false
                }
            }
        })
    }
}

/// Collect up to `max_results` configuration files visible from `roots`.
///
/// Ancestors are checked before descendants, so a config above the
/// workspace wins over one buried in a subproject.
#[must_use]
pub fn find_config_files(roots: &[PathBuf], settings: &DiscoverySettings) -> Vec<PathBuf> {
    let limit = settings.max_results();
    let mut found: Vec<PathBuf> = Vec::new();

    for root in roots {
        for dir in root.ancestors() {
            for name in settings.config_file_names() {
                let candidate = dir.join(name);
                if candidate.is_file() && push_unique(&mut found, candidate) && found.len() >= limit
                {
                    return found;
                }
            }
        }
    }

    for root in roots {
        if !root.is_dir() {
            continue;
        }
        let walker = WalkBuilder::new(root)
            .max_depth(Some(settings.max_depth()))
            .hidden(false)
            .filter_entry(|entry| !is_skipped_dir(entry.path()))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::trace!("Skipping unreadable entry during discovery: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| settings.is_config_file_name(name));
            if matches
                && push_unique(&mut found, entry.into_path())
                && found.len() >= limit
            {
                return found;
            }
        }
    }

    found
}

fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| SKIP_DIRS.contains(&n))
}

fn push_unique(found: &mut Vec<PathBuf>, path: PathBuf) -> bool {
    if found.contains(&path) {
        return false;
    }
    found.push(path);
    true
}
