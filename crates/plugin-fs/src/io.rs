//! Atomic I/O operations with file locking

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoff;
use fs2::FileExt;

use crate::{Error, NormalizedPath, Result};

/// Knobs for durability-sensitive writes.
#[derive(Debug, Clone, Copy)]
pub struct RobustnessConfig {
    /// Call `sync_all` on the temp file before renaming it into place.
    pub enable_fsync: bool,
    /// Upper bound for retrying removals that fail with transient errors.
    pub remove_timeout: Duration,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            enable_fsync: true,
            remove_timeout: Duration::from_secs(2),
        }
    }
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename so readers never observe a partial
/// file. The temp file lives next to the target to stay on the same
/// filesystem and is held under an exclusive advisory lock while written.
pub fn write_atomic(path: &NormalizedPath, content: &[u8], config: RobustnessConfig) -> Result<()> {
    let native_path = path.to_native();

    if let Some(parent) = native_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);
    let temp_name = format!(
        ".{}.{}.{}.tmp",
        native_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id(),
        WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
    );
    let temp_path = native_path.with_file_name(&temp_name);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .lock_exclusive()
        .map_err(|_| Error::LockFailed {
            path: native_path.clone(),
        })?;

    temp_file
        .write_all(content)
        .map_err(|e| Error::io(&temp_path, e))?;

    if config.enable_fsync {
        temp_file
            .sync_all()
            .map_err(|e| Error::io(&temp_path, e))?;
    }

    temp_file.unlock().map_err(|_| Error::LockFailed {
        path: native_path.clone(),
    })?;
    drop(temp_file);

    fs::rename(&temp_path, &native_path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::io(&native_path, e)
    })?;

    Ok(())
}

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath) -> Result<String> {
    let native_path = path.to_native();
    fs::read_to_string(&native_path).map_err(|e| Error::io(&native_path, e))
}

/// Write text content to a file atomically with default robustness.
pub fn write_text(path: &NormalizedPath, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes(), RobustnessConfig::default())
}

/// Move a directory tree to `to`, which must not exist yet.
///
/// Tries a plain rename first. When source and destination sit on
/// different filesystems the tree is copied and the source removed.
pub fn move_dir(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(Error::DestinationExists {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            tracing::debug!(from = %from.display(), to = %to.display(), "Rename crosses filesystems, copying");
            if let Err(copy_err) = copy_dir_all(from, to) {
                let _ = fs::remove_dir_all(to);
                return Err(copy_err);
            }
            remove_dir_all(from, RobustnessConfig::default())
        }
        Err(e) => Err(Error::io(from, e)),
    }
}

/// Move a directory tree to `to`, replacing whatever is there.
///
/// The existing entry is renamed aside to a `.tmp-old-*` sibling first and
/// renamed back if the move fails, so `to` is never left missing. The
/// set-aside copy is deleted once the new tree is in place; if that
/// deletion fails it stays behind for the next temp sweep.
pub fn replace_dir(from: &Path, to: &Path, config: RobustnessConfig) -> Result<()> {
    if fs::symlink_metadata(to).is_err() {
        return move_dir(from, to);
    }

    static BACKUP_SEQ: AtomicU64 = AtomicU64::new(0);
    let backup = to.with_file_name(format!(
        ".tmp-old-{}.{}.{}",
        to.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
        std::process::id(),
        BACKUP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    fs::rename(to, &backup).map_err(|e| Error::io(to, e))?;

    if let Err(e) = move_dir(from, to) {
        match fs::rename(&backup, to) {
            Ok(()) => tracing::debug!(path = %to.display(), "Restored directory after failed replace"),
            Err(restore) => tracing::error!(
                path = %to.display(),
                backup = %backup.display(),
                error = %restore,
                "Failed to restore directory after failed replace"
            ),
        }
        return Err(e);
    }

    let removed = if fs::symlink_metadata(&backup).is_ok_and(|m| m.file_type().is_symlink()) {
        fs::remove_file(&backup).map_err(|e| Error::io(&backup, e))
    } else {
        remove_dir_all(&backup, config)
    };
    if let Err(e) = removed {
        tracing::warn!(backup = %backup.display(), error = %e, "Failed to remove replaced directory");
    }
    Ok(())
}

/// Recursively copy a directory, preserving symlinks as symlinks on Unix.
pub fn copy_dir_all(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).map_err(|e| Error::io(to, e))?;
    for entry in fs::read_dir(from).map_err(|e| Error::io(from, e))? {
        let entry = entry.map_err(|e| Error::io(from, e))?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| Error::io(&src, e))?;

        if file_type.is_dir() {
            copy_dir_all(&src, &dst)?;
        } else if file_type.is_symlink() {
            copy_symlink(&src, &dst)?;
        } else {
            fs::copy(&src, &dst).map_err(|e| Error::io(&src, e))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src).map_err(|e| Error::io(src, e))?;
    std::os::unix::fs::symlink(target, dst).map_err(|e| Error::io(dst, e))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).map_err(|e| Error::io(src, e))?;
    Ok(())
}

/// Remove a directory tree, retrying transient failures.
///
/// Git packfiles can stay read-only or briefly locked (notably on
/// Windows), so failures other than `NotFound` are retried with
/// exponential backoff until `config.remove_timeout` elapses. A missing
/// directory counts as removed.
pub fn remove_dir_all(path: &Path, config: RobustnessConfig) -> Result<()> {
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(50),
        max_interval: Duration::from_millis(500),
        max_elapsed_time: Some(config.remove_timeout),
        ..Default::default()
    };

    backoff::retry(policy, || match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            clear_readonly(path);
            Err(backoff::Error::transient(e))
        }
    })
    .map_err(|e| match e {
        backoff::Error::Permanent(e) | backoff::Error::Transient { err: e, .. } => {
            Error::io(path, e)
        }
    })
}

fn clear_readonly(path: &Path) {
    let Ok(entries) = fs::read_dir(path) else {
        return;
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        if let Ok(meta) = entry.metadata() {
            let mut perms = meta.permissions();
            if perms.readonly() {
                perms.set_readonly(false);
                let _ = fs::set_permissions(&entry_path, perms);
            }
            if meta.is_dir() {
                clear_readonly(&entry_path);
            }
        }
    }
}

fn is_cross_device(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::CrossesDevices
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn move_dir_renames_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested/file.txt"), "data").unwrap();

        let dst = temp.path().join("out/dst");
        move_dir(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(dst.join("nested/file.txt")).unwrap(), "data");
    }

    #[test]
    fn move_dir_refuses_existing_destination() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();

        let err = move_dir(&src, &dst).unwrap_err();
        assert!(matches!(err, Error::DestinationExists { .. }));
        assert!(src.exists());
    }

    #[test]
    fn remove_dir_all_tolerates_missing_directory() {
        let temp = TempDir::new().unwrap();
        remove_dir_all(&temp.path().join("missing"), RobustnessConfig::default()).unwrap();
    }

    #[test]
    fn remove_dir_all_clears_readonly_files() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("pack");
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("objects.pack");
        fs::write(&file, "x").unwrap();
        let mut perms = fs::metadata(&file).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&file, perms).unwrap();

        remove_dir_all(&dir, RobustnessConfig::default()).unwrap();
        assert!(!dir.exists());
    }
}
