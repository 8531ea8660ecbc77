use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::OperationResult;

/// Structured event emitted during execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    OpCompleted {
        source: PathBuf,
        target: PathBuf,
        transaction_id: String,
    },
    OpSkipped {
        source: PathBuf,
        target: PathBuf,
    },
    OpFailed {
        source: PathBuf,
        error: String,
    },
    BatchCompleted {
        successful: usize,
        failed: usize,
        skipped: usize,
    },
    BatchCancelled {
        processed: usize,
        total: usize,
    },
    TxnUndone {
        transaction_id: String,
        operations: usize,
    },
}

impl From<&OperationResult> for Event {
    fn from(result: &OperationResult) -> Self {
        if !result.success {
            Self::OpFailed {
                source: result.source.clone(),
                error: result.error.clone().unwrap_or_default(),
            }
        } else if result.skipped {
            Self::OpSkipped {
                source: result.source.clone(),
                target: result.target.clone(),
            }
        } else {
            Self::OpCompleted {
                source: result.source.clone(),
                target: result.target.clone(),
                transaction_id: result.transaction_id.clone(),
            }
        }
    }
}
