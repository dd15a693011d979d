//! Atomic file write helpers.
//!
//! Uses a temp file + rename pattern so readers never observe a half-written
//! file. On Windows, rename-over-existing fails, so an existing target is moved
//! aside first and restored if the second rename fails.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Permission policy for the persisted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    /// Inherit the process umask.
    Default,
    /// Owner read/write only (0o600 on Unix).
    #[default]
    OwnerOnly,
}

/// Replace `path` with `bytes` atomically, syncing the data before the rename.
pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8], mode: FileMode) -> io::Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent)?;
    apply_mode(tmp.path(), mode)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    if let Err(err) = tmp.persist(path) {
        if !path.exists() {
            return Err(err.error);
        }
        let backup = path.with_extension("bak");
        let _ = fs::remove_file(&backup);
        fs::rename(path, &backup)?;
        if let Err(retry) = err.file.persist(path) {
            let _ = fs::rename(&backup, path);
            return Err(retry.error);
        }
        if let Err(e) = fs::remove_file(&backup) {
            tracing::warn!(path = %backup.display(), "Failed to remove backup after atomic write: {e}");
        }
    }

    apply_mode(path, mode)
}

/// Create `dir` (and parents) and tighten it to owner-only when we own it.
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};
        let metadata = fs::metadata(dir)?;
        // SAFETY: getuid has no preconditions and cannot fail.
        let our_uid = unsafe { libc::getuid() };
        if metadata.uid() == our_uid && metadata.permissions().mode() & 0o077 != 0 {
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: FileMode) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        FileMode::Default => Ok(()),
        FileMode::OwnerOnly => fs::set_permissions(path, fs::Permissions::from_mode(0o600)),
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: FileMode) -> io::Result<()> {
    Ok(())
}
