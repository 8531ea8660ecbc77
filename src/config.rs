use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{ConflictStrategy, DEFAULT_MAX_CONCURRENCY, ExecutionStrategy};

/// Engine settings. Every field has a default so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where the transaction ledger lives.
    pub ledger_path: PathBuf,
    /// Where deleted files are moved.
    pub trash_dir: PathBuf,
    pub conflict_strategy: ConflictStrategy,
    pub max_concurrency: usize,
    pub create_target_dir: bool,
    pub preserve_extension: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(".tidytx/ledger.json"),
            trash_dir: PathBuf::from(".tidytx/trash"),
            conflict_strategy: ConflictStrategy::Suffix,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            create_target_dir: true,
            preserve_extension: true,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn execution_strategy(&self, dry_run: bool) -> ExecutionStrategy {
        ExecutionStrategy {
            dry_run,
            max_concurrency: self.max_concurrency,
            conflict: self.conflict_strategy,
            create_target_dir: self.create_target_dir,
            preserve_extension: self.preserve_extension,
        }
    }
}
