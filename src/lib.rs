//! Transactional file organization engine.
//!
//! Moves, renames and trash-deletes run as single-operation transactions
//! recorded in a durable [`journal::Ledger`], so any committed change can be
//! undone later, including from another process run. [`plan::PlanExecutor`]
//! applies whole plans on a bounded worker pool and reports per-file failures
//! without stopping the batch.

pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod exit_codes;
pub mod fsops;
pub mod journal;
pub mod model;
pub mod plan;
pub mod policy;
pub mod reporter;
pub mod resolve;
pub mod transaction;
pub mod validate;

pub use config::EngineConfig;
pub use error::{Error, PlanError, Result};
pub use executor::OperationExecutor;
pub use journal::Ledger;
pub use model::{
    BatchResult, ConflictStrategy, ExecutionStrategy, MoveOptions, OperationResult, PlannedKind,
    PlannedOperation, RenameOptions,
};
pub use plan::{CancelFlag, PlanExecutor};
pub use policy::{ConflictPrompt, ConflictResolver, PromptChoice, Resolution};
pub use transaction::{ExecutedOperation, OperationKind, Transaction, TxStatus};
