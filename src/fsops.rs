use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, IoContext, Result};

/// Suffix appended to a displaced occupant while an operation is in flight.
pub const BACKUP_SUFFIX: &str = ".backup";

/// `<path>.backup`, keeping the full original file name.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Create a directory and any missing parents. Safe to race.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).io_context(|| format!("failed to create {}", dir.display()))
}

/// Check if two paths are on the same filesystem.
#[cfg(unix)]
fn same_filesystem(src: &Path, dst: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;
    let src_meta = std::fs::symlink_metadata(src)
        .io_context(|| format!("failed to stat {}", src.display()))?;
    let dst_parent = match dst.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dst_parent_meta = std::fs::metadata(dst_parent)
        .io_context(|| format!("failed to stat {}", dst_parent.display()))?;
    Ok(src_meta.dev() == dst_parent_meta.dev())
}

#[cfg(not(unix))]
fn same_filesystem(_src: &Path, _dst: &Path) -> Result<bool> {
    // Let rename decide; a cross-volume error falls through to the copy path.
    Ok(true)
}

/// Move a file or directory, replacing `dst` if it is a file.
///
/// Same-volume moves are a single rename. Cross-volume moves copy then remove
/// the source and are not atomic.
pub fn mv(src: &Path, dst: &Path) -> Result<()> {
    if same_filesystem(src, dst)? {
        match std::fs::rename(src, dst) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
                debug!(src = %src.display(), "rename crossed devices, copying instead");
            }
            Err(e) => {
                return Err(Error::io(
                    format!("failed to rename {} to {}", src.display(), dst.display()),
                    e,
                ));
            }
        }
    }
    copy_then_remove(src, dst)
}

fn copy_then_remove(src: &Path, dst: &Path) -> Result<()> {
    let metadata =
        std::fs::metadata(src).io_context(|| format!("failed to stat {}", src.display()))?;
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    let context = || format!("failed to move {} to {}", src.display(), dst.display());

    if metadata.is_dir() {
        let mut options = fs_extra::dir::CopyOptions::new();
        options.copy_inside = true;
        fs_extra::dir::move_dir(src, dst, &options)
            .map_err(|e| Error::io(context(), std::io::Error::other(e.to_string())))?;
    } else {
        let mut options = fs_extra::file::CopyOptions::new();
        options.overwrite = true;
        fs_extra::file::move_file(src, dst, &options)
            .map_err(|e| Error::io(context(), std::io::Error::other(e.to_string())))?;
    }
    if let Err(e) = filetime::set_file_mtime(dst, mtime) {
        warn!(dst = %dst.display(), error = %e, "could not preserve modification time");
    }
    Ok(())
}

/// Moves whatever occupies `target` to `<target>.backup`.
///
/// Returns the backup location, or `None` when the target was free.
pub fn set_aside(target: &Path) -> Result<Option<PathBuf>> {
    if std::fs::symlink_metadata(target).is_err() {
        return Ok(None);
    }
    let backup = backup_path(target);
    if std::fs::symlink_metadata(&backup).is_ok() {
        return Err(Error::BackupOccupied(backup));
    }
    std::fs::rename(target, &backup)
        .io_context(|| format!("failed to back up {}", target.display()))?;
    debug!(dest = %target.display(), backup = %backup.display(), "occupant set aside");
    Ok(Some(backup))
}

/// Puts a backup taken by [`set_aside`] back in place. Logs instead of failing.
pub fn restore_backup(backup: Option<&Path>, target: &Path) {
    if let Some(backup) = backup
        && let Err(e) = std::fs::rename(backup, target)
    {
        warn!(
            backup = %backup.display(),
            dest = %target.display(),
            error = %e,
            "failed to restore backup; manual recovery needed"
        );
    }
}

/// Drops a backup once the operation it protected has committed.
pub fn discard_backup(backup: Option<&Path>) {
    let Some(backup) = backup else { return };
    let result = match std::fs::symlink_metadata(backup) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(backup),
        Ok(_) => std::fs::remove_file(backup),
        Err(_) => return,
    };
    if let Err(e) = result {
        warn!(backup = %backup.display(), error = %e, "failed to remove backup");
    }
}
