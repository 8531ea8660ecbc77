use std::path::PathBuf;

use thiserror::Error;

use crate::model::BatchResult;
use crate::transaction::TxStatus;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid file name '{name}': {reason}")]
    InvalidFilename { name: String, reason: String },

    #[error("path escapes target directory: {path} is outside {base}")]
    PathTraversal { path: PathBuf, base: PathBuf },

    #[error("cannot move {path} into itself ({target})")]
    SourceIsAncestor { path: PathBuf, target: PathBuf },

    #[error("target is already being written by another operation: {0}")]
    TargetBusy(PathBuf),

    #[error("source does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("target directory does not exist: {0}")]
    TargetDirMissing(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("malformed planned operation: {0}")]
    MalformedOperation(String),

    #[error("unknown conflict strategy: {0}")]
    UnknownStrategy(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("transaction {id} is {status}, expected {expected}")]
    InvalidStatus {
        id: String,
        status: TxStatus,
        expected: TxStatus,
    },

    #[error("cannot restore {0}: the path is occupied again")]
    SourceOccupied(PathBuf),

    #[error("backup location already exists: {0}")]
    BackupOccupied(PathBuf),

    #[error("operation on {0} has no backup and cannot be reversed")]
    NotRecoverable(PathBuf),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors that end a whole batch rather than a single operation.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The cancel flag fired before every operation was dispatched.
    #[error("batch cancelled after {} of {total} operations", .partial.processed())]
    Cancelled {
        partial: Box<BatchResult>,
        total: usize,
    },

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Adds a path-aware context to raw io errors.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::io(f(), e))
    }
}
