use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::PlanError;
use crate::executor::OperationExecutor;
use crate::model::{BatchResult, ExecutionStrategy, OperationResult, PlannedKind, PlannedOperation};

/// Shared cancellation signal, optionally with a deadline.
///
/// Polled between operations; an operation already running always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag that also trips once `budget` has elapsed.
    pub fn with_deadline(budget: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Instant::now().checked_add(budget),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Runs a list of planned operations on a bounded worker pool.
#[derive(Debug, Clone)]
pub struct PlanExecutor {
    executor: Arc<OperationExecutor>,
}

impl PlanExecutor {
    pub fn new(executor: Arc<OperationExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &OperationExecutor {
        &self.executor
    }

    /// Execute every planned operation and aggregate the outcomes.
    ///
    /// Individual failures are recorded, never fatal. Cancellation stops new
    /// work and returns what finished so far inside [`PlanError::Cancelled`].
    pub fn execute_plan(
        &self,
        ops: &[PlannedOperation],
        strategy: &ExecutionStrategy,
        cancel: &CancelFlag,
    ) -> Result<BatchResult, PlanError> {
        self.execute_plan_with(ops, strategy, cancel, |_| {})
    }

    /// Like [`execute_plan`](Self::execute_plan), calling `observe` with each
    /// result as it lands. `observe` runs on worker threads.
    pub fn execute_plan_with<F>(
        &self,
        ops: &[PlannedOperation],
        strategy: &ExecutionStrategy,
        cancel: &CancelFlag,
        observe: F,
    ) -> Result<BatchResult, PlanError>
    where
        F: Fn(&OperationResult) + Sync,
    {
        if strategy.dry_run {
            let mut batch = BatchResult::default();
            for op in ops {
                let result = OperationResult::succeeded(&op.source, &op.target, "");
                observe(&result);
                batch.record(&result);
            }
            info!(operations = ops.len(), "dry run, nothing executed");
            return Ok(batch);
        }

        let workers = strategy.workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tidytx-worker-{i}"))
            .build()?;
        debug!(workers, operations = ops.len(), "executing plan");

        let batch = Mutex::new(BatchResult::default());
        pool.install(|| {
            ops.par_iter().with_max_len(1).for_each(|op| {
                if cancel.is_cancelled() {
                    return;
                }
                let result = self.dispatch(op, strategy);
                observe(&result);
                batch
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record(&result);
            });
        });

        let batch = batch.into_inner().unwrap_or_else(|e| e.into_inner());
        if batch.processed() < ops.len() {
            warn!(
                processed = batch.processed(),
                total = ops.len(),
                "plan cancelled before completion"
            );
            return Err(PlanError::Cancelled {
                partial: Box::new(batch),
                total: ops.len(),
            });
        }
        info!(
            successful = batch.successful,
            failed = batch.failed,
            skipped = batch.skipped,
            "plan executed"
        );
        Ok(batch)
    }

    fn dispatch(&self, op: &PlannedOperation, strategy: &ExecutionStrategy) -> OperationResult {
        if let Err(e) = op.validate() {
            warn!(source = %op.source.display(), error = %e, "rejected planned operation");
            return OperationResult::failed(&op.source, &op.target, e);
        }
        match op.kind {
            PlannedKind::Move => {
                let dir = match op.target.parent() {
                    Some(p) if !p.as_os_str().is_empty() => p,
                    _ => Path::new("."),
                };
                self.executor
                    .move_file(&op.source, dir, &strategy.move_options())
            }
            PlannedKind::Rename => {
                let name = op
                    .target
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.executor
                    .rename_file(&op.source, &name, &strategy.rename_options())
            }
        }
    }
}
