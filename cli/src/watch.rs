//! File watcher trigger source.
//!
//! Watches every workspace root recursively for formatter config files, and
//! the directories of the host config and trust store for edits to those
//! files. Any relevant event becomes a reinitialization trigger; the
//! controller does the debouncing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fmtlink_core::ReinitTrigger;
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Decides which paths are worth a trigger.
#[derive(Debug)]
pub struct ConfigMatcher {
    config_files: GlobSet,
    /// Host-level files matched by exact path.
    host_files: Vec<PathBuf>,
}

impl ConfigMatcher {
    pub fn new(config_file_names: &[String], host_files: &[&Path]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for name in config_file_names {
            let pattern = format!("**/{}", globset::escape(name));
            builder.add(Glob::new(&pattern).with_context(|| format!("bad config name {name}"))?);
        }
        Ok(Self {
            config_files: builder.build().context("building config file matcher")?,
            host_files: host_files.iter().map(|p| p.to_path_buf()).collect(),
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.config_files.is_match(path) || self.host_files.iter().any(|f| f == path)
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
            | EventKind::Any
    )
}

pub struct ConfigWatcher {
    watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn new(trigger: ReinitTrigger, matcher: ConfigMatcher) -> Result<Self> {
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !is_relevant(&event.kind) {
                    return;
                }
                if let Some(path) = event.paths.iter().find(|p| matcher.matches(p)) {
                    tracing::debug!(path = %path.display(), kind = ?event.kind, "Config change detected");
                    trigger.trigger();
                }
            }
            Err(e) => tracing::warn!("File watcher error: {e}"),
        })
        .context("creating file watcher")?;

        Ok(Self { watcher })
    }

    pub fn watch_root(&mut self, root: &Path) {
        match self.watcher.watch(root, RecursiveMode::Recursive) {
            Ok(()) => tracing::debug!(path = %root.display(), "Watching workspace folder"),
            Err(e) => tracing::warn!("Failed to watch {}: {e}", root.display()),
        }
    }

    pub fn unwatch_root(&mut self, root: &Path) {
        if let Err(e) = self.watcher.unwatch(root) {
            tracing::debug!("Failed to unwatch {}: {e}", root.display());
        }
    }

    /// Watch the directory holding `file`, so saves that replace the file
    /// (write-to-temp then rename) are seen too.
    pub fn watch_file(&mut self, file: &Path) {
        let Some(dir) = file.parent().filter(|d| d.is_dir()) else {
            tracing::debug!(path = %file.display(), "Config directory missing; not watching");
            return;
        };
        if let Err(e) = self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            tracing::warn!("Failed to watch {}: {e}", dir.display());
        }
    }
}
