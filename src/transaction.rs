use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, IoContext, Result};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Committed,
    RolledBack,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// Kind of an executed filesystem change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Move,
    Rename,
    Delete,
    Mkdir,
}

/// A filesystem change as it was actually applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutedOperation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub source: PathBuf,
    pub target: PathBuf,
    /// Where the pre-operation state was preserved. `None` means not recoverable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
}

impl ExecutedOperation {
    pub fn new(kind: OperationKind, source: &Path, target: &Path, backup: Option<&Path>) -> Self {
        Self {
            kind,
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            backup: backup.map(Path::to_path_buf),
        }
    }

    /// Reverses this operation on disk.
    pub(crate) fn reverse(&self) -> Result<()> {
        match self.kind {
            OperationKind::Move | OperationKind::Rename => {
                ensure_vacant(&self.source)?;
                ensure_parent(&self.source)?;
                crate::fsops::mv(&self.target, &self.source)?;
                // A displaced occupant is only restorable if its backup survived.
                if let Some(backup) = &self.backup
                    && backup.exists()
                {
                    crate::fsops::mv(backup, &self.target)?;
                }
            }
            OperationKind::Delete => {
                let backup = self
                    .backup
                    .as_ref()
                    .ok_or_else(|| Error::NotRecoverable(self.source.clone()))?;
                ensure_vacant(&self.source)?;
                ensure_parent(&self.source)?;
                crate::fsops::mv(backup, &self.source)?;
            }
            OperationKind::Mkdir => match std::fs::remove_dir(&self.target) {
                Ok(()) => {}
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::DirectoryNotEmpty | std::io::ErrorKind::NotFound
                    ) =>
                {
                    debug!(dir = %self.target.display(), error = %e, "left directory in place");
                }
                Err(e) => {
                    return Err(Error::io(
                        format!("failed to remove directory {}", self.target.display()),
                        e,
                    ));
                }
            },
        }
        Ok(())
    }
}

/// Refuses to restore onto a path that something else now occupies.
fn ensure_vacant(path: &Path) -> Result<()> {
    if std::fs::symlink_metadata(path).is_ok() {
        return Err(Error::SourceOccupied(path.to_path_buf()));
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .io_context(|| format!("failed to recreate {}", parent.display()))?;
    }
    Ok(())
}

/// An ordered group of operations with a status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
    pub operations: Vec<ExecutedOperation>,
}

impl Transaction {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            status: TxStatus::Pending,
            operations: Vec::new(),
        }
    }

    /// Appends an operation. Ignored once the transaction has left `Pending`.
    pub fn add_operation(&mut self, op: ExecutedOperation) {
        if self.status != TxStatus::Pending {
            warn!(tx = %self.id, status = %self.status, "ignoring operation on closed transaction");
            return;
        }
        self.operations.push(op);
    }

    pub fn is_pending(&self) -> bool {
        self.status == TxStatus::Pending
    }

    /// Reverses every operation, last applied first. Stops at the first failure.
    pub(crate) fn reverse_all(&self) -> Result<()> {
        for op in self.operations.iter().rev() {
            debug!(tx = %self.id, kind = ?op.kind, dest = %op.target.display(), "reversing");
            op.reverse()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_add_operation_only_while_pending() {
        let mut tx = Transaction::new("tx_1".into());
        tx.add_operation(ExecutedOperation::new(
            OperationKind::Move,
            Path::new("a"),
            Path::new("b"),
            None,
        ));
        tx.status = TxStatus::Committed;
        tx.add_operation(ExecutedOperation::new(
            OperationKind::Move,
            Path::new("c"),
            Path::new("d"),
            None,
        ));
        assert_eq!(tx.operations.len(), 1);
    }

    #[test]
    fn test_reverse_order_removes_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let outer = dir.path().join("outer");
        let inner = outer.join("inner");
        fs::create_dir_all(&inner).unwrap();
        fs::write(dir.path().join("f.txt"), "x").unwrap();
        fs::rename(dir.path().join("f.txt"), inner.join("f.txt")).unwrap();

        let mut tx = Transaction::new("tx_2".into());
        tx.add_operation(ExecutedOperation::new(OperationKind::Mkdir, Path::new(""), &outer, None));
        tx.add_operation(ExecutedOperation::new(OperationKind::Mkdir, Path::new(""), &inner, None));
        tx.add_operation(ExecutedOperation::new(
            OperationKind::Move,
            &dir.path().join("f.txt"),
            &inner.join("f.txt"),
            None,
        ));
        tx.reverse_all().unwrap();

        assert!(dir.path().join("f.txt").exists());
        assert!(!outer.exists());
    }

    #[test]
    fn test_mkdir_reverse_ignores_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("keep.txt"), "x").unwrap();
        let op = ExecutedOperation::new(OperationKind::Mkdir, Path::new(""), &sub, None);
        op.reverse().unwrap();
        assert!(sub.join("keep.txt").exists());
    }

    #[test]
    fn test_delete_without_backup_is_not_recoverable() {
        let op = ExecutedOperation::new(OperationKind::Delete, Path::new("gone"), Path::new(""), None);
        assert!(matches!(op.reverse(), Err(Error::NotRecoverable(_))));
    }

    #[test]
    fn test_reverse_refuses_occupied_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&dst, "moved").unwrap();
        fs::write(&src, "someone else").unwrap();

        let op = ExecutedOperation::new(OperationKind::Move, &src, &dst, None);
        assert!(matches!(op.reverse(), Err(Error::SourceOccupied(_))));
        assert_eq!(fs::read_to_string(&src).unwrap(), "someone else");
        assert_eq!(fs::read_to_string(&dst).unwrap(), "moved");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TxStatus::RolledBack).unwrap();
        assert_eq!(json, "\"rolled_back\"");
    }
}
