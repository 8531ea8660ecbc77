//! Durable transaction ledger.
//!
//! All transactions live in one JSON file that is rewritten in full on every
//! mutation. Writes go through a temp file in the same directory and are
//! renamed into place, so a crash mid-write leaves the previous ledger intact.
//! One mutex serializes every read and write within a process; nothing guards
//! against a second process sharing the file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::TickSource;
use crate::error::{Error, IoContext, Result};
use crate::transaction::{ExecutedOperation, Transaction, TxStatus};

/// Current on-disk layout version.
pub const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    transactions: Vec<Transaction>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredLedger {
    Versioned(LedgerFile),
    Bare(Vec<Transaction>),
}

/// Persistent record of transactions with begin/commit/rollback/undo.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    lock: Mutex<()>,
    ticks: TickSource,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            ticks: TickSource::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a transaction in memory. Nothing is written until commit.
    pub fn begin(&self) -> Transaction {
        Transaction::new(format!("tx_{}", self.ticks.next()))
    }

    /// Append an operation to a pending transaction.
    pub fn add_operation(&self, tx: &mut Transaction, op: ExecutedOperation) {
        tx.add_operation(op);
    }

    /// Mark committed and persist. On failure the transaction stays pending.
    pub fn commit(&self, tx: &mut Transaction) -> Result<()> {
        if !tx.is_pending() {
            return Err(Error::InvalidStatus {
                id: tx.id.clone(),
                status: tx.status,
                expected: TxStatus::Pending,
            });
        }
        let _guard = self.guard();
        tx.status = TxStatus::Committed;
        if let Err(e) = self.upsert(tx) {
            tx.status = TxStatus::Pending;
            return Err(e);
        }
        info!(tx = %tx.id, ops = tx.operations.len(), "transaction committed");
        Ok(())
    }

    /// Reverse a transaction that has not been committed, then persist it as rolled back.
    pub fn rollback(&self, tx: &mut Transaction) -> Result<()> {
        if !tx.is_pending() {
            return Err(Error::InvalidStatus {
                id: tx.id.clone(),
                status: tx.status,
                expected: TxStatus::Pending,
            });
        }
        let _guard = self.guard();
        tx.reverse_all()?;
        tx.status = TxStatus::RolledBack;
        self.upsert(tx)?;
        info!(tx = %tx.id, "transaction rolled back");
        Ok(())
    }

    /// Reverse a committed transaction loaded from disk.
    ///
    /// A failure part way leaves the transaction committed and the filesystem
    /// partially reversed.
    pub fn undo(&self, id: &str) -> Result<Transaction> {
        let _guard = self.guard();
        let mut transactions = self.load()?;
        let tx = transactions
            .iter_mut()
            .find(|tx| tx.id == id)
            .ok_or_else(|| Error::TransactionNotFound(id.to_string()))?;
        if tx.status != TxStatus::Committed {
            return Err(Error::InvalidStatus {
                id: tx.id.clone(),
                status: tx.status,
                expected: TxStatus::Committed,
            });
        }
        if let Err(e) = tx.reverse_all() {
            warn!(tx = %id, error = %e, "undo failed part way, inspect the filesystem");
            return Err(e);
        }
        tx.status = TxStatus::RolledBack;
        let undone = tx.clone();
        self.save(&transactions)?;
        info!(tx = %id, "transaction undone");
        Ok(undone)
    }

    /// The last `limit` transactions, oldest first. Zero means all.
    pub fn history(&self, limit: usize) -> Result<Vec<Transaction>> {
        let _guard = self.guard();
        let mut transactions = self.load()?;
        if limit > 0 && transactions.len() > limit {
            transactions.drain(..transactions.len() - limit);
        }
        Ok(transactions)
    }

    /// Look up one persisted transaction.
    pub fn get(&self, id: &str) -> Result<Option<Transaction>> {
        let _guard = self.guard();
        Ok(self.load()?.into_iter().find(|tx| tx.id == id))
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is the file on disk, so a poisoned lock is still usable.
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn upsert(&self, tx: &Transaction) -> Result<()> {
        let mut transactions = self.load()?;
        match transactions.iter_mut().find(|t| t.id == tx.id) {
            Some(existing) => *existing = tx.clone(),
            None => transactions.push(tx.clone()),
        }
        self.save(&transactions)
    }

    fn load(&self) -> Result<Vec<Transaction>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::io(
                    format!("failed to read ledger {}", self.path.display()),
                    e,
                ));
            }
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let stored: StoredLedger = serde_json::from_str(&content)?;
        Ok(match stored {
            StoredLedger::Versioned(file) => {
                if file.version > LEDGER_VERSION {
                    warn!(version = file.version, "ledger written by a newer version");
                }
                file.transactions
            }
            StoredLedger::Bare(transactions) => transactions,
        })
    }

    fn save(&self, transactions: &[Transaction]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .io_context(|| format!("failed to create ledger directory {}", dir.display()))?;

        let file = LedgerFile {
            version: LEDGER_VERSION,
            transactions: transactions.to_vec(),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .io_context(|| format!("failed to stage ledger in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &file)?;
        tmp.write_all(b"\n")
            .and_then(|()| tmp.as_file().sync_all())
            .io_context(|| "failed to flush ledger")?;
        tmp.persist(&self.path)
            .map_err(|e| Error::io(format!("failed to write ledger {}", self.path.display()), e.error))?;
        Ok(())
    }
}
