//! Single-file move, rename and delete, each as its own transaction.
//!
//! Every operation runs the same sequence: validate, resolve the target, set
//! aside any occupant as `<target>.backup`, apply the change, log and commit
//! it, then drop the backup. Failures put things back as far as possible.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fsops;
use crate::journal::Ledger;
use crate::model::{ConflictStrategy, MoveOptions, OperationResult, RenameOptions};
use crate::policy::{ConflictResolver, Resolution};
use crate::resolve;
use crate::transaction::{ExecutedOperation, OperationKind};
use crate::validate;

/// Runs filesystem operations against a shared ledger.
#[derive(Debug)]
pub struct OperationExecutor {
    ledger: Arc<Ledger>,
    resolver: ConflictResolver,
    /// Targets claimed by operations still in flight in this process.
    reserved: Mutex<HashSet<PathBuf>>,
}

/// Releases a claimed target when the operation finishes.
struct Reservation<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.path);
    }
}

fn lock(set: &Mutex<HashSet<PathBuf>>) -> MutexGuard<'_, HashSet<PathBuf>> {
    set.lock().unwrap_or_else(|e| e.into_inner())
}

impl OperationExecutor {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            resolver: ConflictResolver::new(),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Use a resolver with an interactive prompt attached.
    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Move `source` into `target_dir`, keeping its file name.
    pub fn move_file(&self, source: &Path, target_dir: &Path, options: &MoveOptions) -> OperationResult {
        self.try_move(source, target_dir, options)
            .unwrap_or_else(|e| fail(source, target_dir, e))
    }

    /// Rename `source` in place to `new_name`.
    pub fn rename_file(&self, source: &Path, new_name: &str, options: &RenameOptions) -> OperationResult {
        self.try_rename(source, new_name, options)
            .unwrap_or_else(|e| fail(source, Path::new(new_name), e))
    }

    /// Move `source` into `trash_dir`, never overwriting what is already there.
    ///
    /// Only an unusable trash directory is reported as `Err`.
    pub fn delete_file(&self, source: &Path, trash_dir: &Path) -> Result<OperationResult> {
        fsops::ensure_dir(trash_dir)?;
        Ok(self
            .try_delete(source, trash_dir)
            .unwrap_or_else(|e| fail(source, trash_dir, e)))
    }

    fn try_move(&self, source: &Path, target_dir: &Path, options: &MoveOptions) -> Result<OperationResult> {
        validate::require_source(source)?;
        let source = resolve::clean_path(source)?;
        let dir = resolve::clean_path(target_dir)?;
        let name = file_name_of(&source)?;
        let desired = resolve::confined_join(&dir, Path::new(name))?;

        let missing_dir = match std::fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => false,
            Ok(_) => return Err(Error::NotADirectory(dir)),
            Err(_) => true,
        };
        if missing_dir && !options.create_target_dir {
            return Err(Error::TargetDirMissing(dir));
        }

        self.apply(
            OperationKind::Move,
            &source,
            &desired,
            options.strategy,
            options.dry_run,
            || {
                if missing_dir {
                    debug!(dir = %dir.display(), "creating target directory");
                    fsops::ensure_dir(&dir)?;
                }
                Ok(())
            },
        )
    }

    fn try_rename(&self, source: &Path, new_name: &str, options: &RenameOptions) -> Result<OperationResult> {
        validate::require_source(source)?;
        validate::validate_filename(new_name)?;
        let source = resolve::clean_path(source)?;
        let final_name = if options.preserve_extension {
            validate::preserve_extension(&source, new_name)
        } else {
            new_name.to_string()
        };
        validate::validate_filename(&final_name)?;

        let parent = source.parent().unwrap_or_else(|| Path::new("/"));
        let desired = parent.join(&final_name);
        if desired == source {
            debug!(source = %source.display(), "rename to same name, nothing to do");
            return Ok(OperationResult::succeeded(&source, &desired, ""));
        }

        self.apply(
            OperationKind::Rename,
            &source,
            &desired,
            options.strategy,
            options.dry_run,
            || Ok(()),
        )
    }

    fn try_delete(&self, source: &Path, trash_dir: &Path) -> Result<OperationResult> {
        validate::require_source(source)?;
        let source = resolve::clean_path(source)?;
        let trash = resolve::clean_path(trash_dir)?;
        let name = file_name_of(&source)?;
        let desired = resolve::confined_join(&trash, Path::new(name))?;

        self.apply(
            OperationKind::Delete,
            &source,
            &desired,
            ConflictStrategy::Suffix,
            false,
            || Ok(()),
        )
    }

    /// Resolve, back up, act, log, commit, clean up.
    fn apply<F>(
        &self,
        kind: OperationKind,
        source: &Path,
        desired: &Path,
        strategy: ConflictStrategy,
        dry_run: bool,
        prepare: F,
    ) -> Result<OperationResult>
    where
        F: FnOnce() -> Result<()>,
    {
        if desired != source && desired.starts_with(source) {
            return Err(Error::SourceIsAncestor {
                path: source.to_path_buf(),
                target: desired.to_path_buf(),
            });
        }

        let (target, _reservation) = {
            let mut reserved = lock(&self.reserved);
            let resolution = self
                .resolver
                .resolve_with(desired, strategy, |p| reserved.contains(p) || p.exists());
            let target = match resolution {
                Resolution::Skip => {
                    debug!(source = %source.display(), dest = %desired.display(), "skipped");
                    return Ok(OperationResult::skipped(source, desired));
                }
                Resolution::Target(target) => target,
            };
            if dry_run || target == source {
                return Ok(OperationResult::succeeded(source, &target, ""));
            }
            if !reserved.insert(target.clone()) {
                return Err(Error::TargetBusy(target));
            }
            let reservation = Reservation {
                set: &self.reserved,
                path: target.clone(),
            };
            (target, reservation)
        };

        prepare()?;

        let backup = fsops::set_aside(&target)?;
        if let Err(e) = fsops::mv(source, &target) {
            fsops::restore_backup(backup.as_deref(), &target);
            return Err(e);
        }

        let recorded_backup = match kind {
            OperationKind::Delete => Some(target.as_path()),
            _ => backup.as_deref(),
        };
        let mut tx = self.ledger.begin();
        self.ledger.add_operation(
            &mut tx,
            ExecutedOperation::new(kind, source, &target, recorded_backup),
        );
        if let Err(e) = self.ledger.commit(&mut tx) {
            warn!(tx = %tx.id, error = %e, "commit failed, reverting");
            match fsops::mv(&target, source) {
                Ok(()) => fsops::restore_backup(backup.as_deref(), &target),
                Err(revert) => warn!(
                    source = %source.display(),
                    dest = %target.display(),
                    error = %revert,
                    "could not revert after failed commit; manual recovery needed"
                ),
            }
            return Err(e);
        }

        fsops::discard_backup(backup.as_deref());
        info!(
            tx = %tx.id,
            kind = ?kind,
            source = %source.display(),
            dest = %target.display(),
            "operation committed"
        );
        Ok(OperationResult::succeeded(source, &target, tx.id))
    }
}

fn file_name_of(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name().ok_or_else(|| Error::InvalidFilename {
        name: path.display().to_string(),
        reason: "path has no file name".into(),
    })
}

fn fail(source: &Path, target: &Path, error: Error) -> OperationResult {
    warn!(source = %source.display(), error = %error, "operation failed");
    OperationResult::failed(source, target, error)
}
