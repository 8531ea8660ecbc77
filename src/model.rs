use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Worker count used when a strategy asks for zero.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// A plan file: the list of operations an upstream planner wants applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// Operations in the order they were planned.
    pub operations: Vec<PlannedOperation>,
}

/// Kind of a planned operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlannedKind {
    /// Move the source into the target's parent directory.
    Move,
    /// Rename the source in place to the target's file name.
    Rename,
}

/// A single operation produced by the rule or suggestion layer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PlannedOperation {
    /// Operation kind.
    #[serde(rename = "type")]
    pub kind: PlannedKind,
    /// File to act on.
    pub source: PathBuf,
    /// Desired final location of the file.
    pub target: PathBuf,
    /// Why the planner chose this operation.
    #[serde(default)]
    pub reason: String,
}

impl PlannedOperation {
    pub fn new(
        kind: PlannedKind,
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Checks that the operation is well formed. Says nothing about why it was chosen.
    pub fn validate(&self) -> Result<()> {
        if self.source.as_os_str().is_empty() {
            return Err(Error::MalformedOperation("empty source path".into()));
        }
        if self.target.as_os_str().is_empty() {
            return Err(Error::MalformedOperation(format!(
                "empty target path for {}",
                self.source.display()
            )));
        }
        if self.kind == PlannedKind::Rename && self.target.file_name().is_none() {
            return Err(Error::MalformedOperation(format!(
                "rename target has no file name: {}",
                self.target.display()
            )));
        }
        Ok(())
    }
}

/// What to do when the computed target already exists.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
    PartialEq,
    Eq,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Leave the source alone and report a skip.
    Skip,
    /// Write next to the existing file under a timestamped name.
    #[default]
    Suffix,
    /// Replace the existing file.
    Overwrite,
    /// Ask a configured prompt; falls back to `suffix` without one.
    Prompt,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Suffix => "suffix",
            Self::Overwrite => "overwrite",
            Self::Prompt => "prompt",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "suffix" | "rename" => Ok(Self::Suffix),
            "overwrite" => Ok(Self::Overwrite),
            "prompt" | "ask" => Ok(Self::Prompt),
            _ => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

/// Options for a single move.
#[derive(Debug, Clone, Default)]
pub struct MoveOptions {
    pub strategy: ConflictStrategy,
    /// Create the target directory (and parents) when missing.
    pub create_target_dir: bool,
    pub dry_run: bool,
}

/// Options for a single rename.
#[derive(Debug, Clone)]
pub struct RenameOptions {
    pub strategy: ConflictStrategy,
    /// Keep the source's extension regardless of the one in the new name.
    pub preserve_extension: bool,
    pub dry_run: bool,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            strategy: ConflictStrategy::Suffix,
            preserve_extension: true,
            dry_run: false,
        }
    }
}

/// How a batch is executed.
#[derive(Debug, Clone)]
pub struct ExecutionStrategy {
    pub dry_run: bool,
    /// Worker pool size; zero means [`DEFAULT_MAX_CONCURRENCY`].
    pub max_concurrency: usize,
    pub conflict: ConflictStrategy,
    pub create_target_dir: bool,
    pub preserve_extension: bool,
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            conflict: ConflictStrategy::Suffix,
            create_target_dir: true,
            preserve_extension: true,
        }
    }
}

impl ExecutionStrategy {
    pub fn workers(&self) -> usize {
        if self.max_concurrency == 0 {
            DEFAULT_MAX_CONCURRENCY
        } else {
            self.max_concurrency
        }
    }

    pub fn move_options(&self) -> MoveOptions {
        MoveOptions {
            strategy: self.conflict,
            create_target_dir: self.create_target_dir,
            dry_run: self.dry_run,
        }
    }

    pub fn rename_options(&self) -> RenameOptions {
        RenameOptions {
            strategy: self.conflict,
            preserve_extension: self.preserve_extension,
            dry_run: self.dry_run,
        }
    }
}

/// Outcome of one executed operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationResult {
    pub success: bool,
    /// The conflict strategy chose to leave the file alone.
    #[serde(default)]
    pub skipped: bool,
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Empty unless a transaction committed.
    #[serde(default)]
    pub transaction_id: String,
}

impl OperationResult {
    pub fn succeeded(source: &Path, target: &Path, transaction_id: impl Into<String>) -> Self {
        Self {
            success: true,
            skipped: false,
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            error: None,
            transaction_id: transaction_id.into(),
        }
    }

    pub fn skipped(source: &Path, target: &Path) -> Self {
        Self {
            skipped: true,
            ..Self::succeeded(source, target, "")
        }
    }

    pub fn failed(source: &Path, target: &Path, error: impl fmt::Display) -> Self {
        Self {
            success: false,
            skipped: false,
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            error: Some(error.to_string()),
            transaction_id: String::new(),
        }
    }
}

/// Aggregated outcome of a plan run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchResult {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub transaction_ids: Vec<String>,
    pub failed_files: BTreeMap<PathBuf, String>,
}

impl BatchResult {
    /// Folds one operation outcome into the totals.
    pub fn record(&mut self, result: &OperationResult) {
        if !result.success {
            let message = result
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            self.failed += 1;
            self.errors
                .push(format!("{}: {}", result.source.display(), message));
            self.failed_files.insert(result.source.clone(), message);
        } else if result.skipped {
            self.skipped += 1;
        } else {
            self.successful += 1;
            if !result.transaction_id.is_empty() {
                self.transaction_ids.push(result.transaction_id.clone());
            }
        }
    }

    /// Number of operations accounted for so far.
    pub fn processed(&self) -> usize {
        self.successful + self.failed + self.skipped
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Generate JSON Schema for the plan file.
pub fn generate_schema() -> Result<String> {
    let schema = schemars::schema_for!(Plan);
    Ok(serde_json::to_string_pretty(&schema)?)
}

/// Load a plan from a JSON file.
pub fn load_plan(path: &Path) -> anyhow::Result<Plan> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let plan = serde_json::from_reader(reader)?;
    Ok(plan)
}

/// Create a plan from a JSON string.
pub fn from_json(json: &str) -> anyhow::Result<Plan> {
    let plan = serde_json::from_str(json)?;
    Ok(plan)
}
