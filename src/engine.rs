use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::cli::{ApplyArgs, DeleteArgs, GlobalArgs, HistoryArgs, UndoArgs};
use crate::config::EngineConfig;
use crate::error::{Error, PlanError};
use crate::events::Event;
use crate::executor::OperationExecutor;
use crate::exit_codes::exit;
use crate::journal::Ledger;
use crate::model;
use crate::plan::{CancelFlag, PlanExecutor};
use crate::reporter::Reporter;

/// Resolve config from file plus global overrides.
pub fn load_config(global: &GlobalArgs) -> Result<EngineConfig> {
    let mut config = EngineConfig::load_or_default(global.config.as_deref())?;
    if let Some(ledger) = &global.ledger {
        config.ledger_path = ledger.clone();
    }
    Ok(config)
}

fn build_executor(config: &EngineConfig) -> Arc<OperationExecutor> {
    let ledger = Arc::new(Ledger::new(&config.ledger_path));
    Arc::new(OperationExecutor::new(ledger))
}

pub fn apply(global: &GlobalArgs, args: ApplyArgs) -> Result<i32> {
    let reporter = Reporter::new(args.json);
    let mut config = load_config(global)?;
    if let Some(strategy) = args.strategy {
        config.conflict_strategy = strategy;
    }
    if let Some(max_concurrency) = args.max_concurrency {
        config.max_concurrency = max_concurrency;
    }
    if args.no_create_dirs {
        config.create_target_dir = false;
    }
    if args.no_preserve_extension {
        config.preserve_extension = false;
    }

    let plan = model::load_plan(&args.plan).context("failed to load plan")?;
    let strategy = config.execution_strategy(args.dry_run);
    let cancel = match args.deadline {
        Some(budget) => CancelFlag::with_deadline(budget),
        None => CancelFlag::new(),
    };

    let executor = PlanExecutor::new(build_executor(&config));
    let streaming = Mutex::new(reporter);
    let outcome = executor.execute_plan_with(&plan.operations, &strategy, &cancel, |result| {
        streaming
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(Event::from(result));
    });
    let mut reporter = streaming.into_inner().unwrap_or_else(|e| e.into_inner());

    let (batch, cancelled) = match outcome {
        Ok(batch) => (batch, false),
        Err(PlanError::Cancelled { partial, total }) => {
            reporter.record(Event::BatchCancelled {
                processed: partial.processed(),
                total,
            });
            (*partial, true)
        }
        Err(e) => return Err(e).context("failed to execute plan"),
    };

    reporter.record(Event::BatchCompleted {
        successful: batch.successful,
        failed: batch.failed,
        skipped: batch.skipped,
    });
    reporter.finish();

    Ok(if cancelled {
        exit::CANCELLED
    } else if batch.is_clean() {
        exit::SUCCESS
    } else {
        exit::PARTIAL_FAILURE
    })
}

pub fn delete(global: &GlobalArgs, args: DeleteArgs) -> Result<i32> {
    let mut reporter = Reporter::new(args.json);
    let config = load_config(global)?;
    let trash = args.trash.unwrap_or_else(|| config.trash_dir.clone());
    let executor = build_executor(&config);

    let mut failed = false;
    for path in &args.paths {
        let result = executor
            .delete_file(path, &trash)
            .with_context(|| format!("cannot use trash directory {}", trash.display()))?;
        failed |= !result.success;
        reporter.record(Event::from(&result));
    }
    reporter.finish();
    Ok(if failed { exit::PARTIAL_FAILURE } else { exit::SUCCESS })
}

pub fn undo(global: &GlobalArgs, args: UndoArgs) -> Result<i32> {
    let mut reporter = Reporter::new(args.json);
    let config = load_config(global)?;
    let ledger = Ledger::new(&config.ledger_path);
    let tx = match ledger.undo(&args.id) {
        Ok(tx) => tx,
        Err(e @ (Error::TransactionNotFound(_) | Error::InvalidStatus { .. })) => {
            eprintln!("error: {e}");
            return Ok(exit::USAGE_FAILURE);
        }
        Err(e) => return Err(e).with_context(|| format!("failed to undo {}", args.id)),
    };
    reporter.record(Event::TxnUndone {
        transaction_id: tx.id.clone(),
        operations: tx.operations.len(),
    });
    reporter.finish();
    Ok(exit::SUCCESS)
}

pub fn history(global: &GlobalArgs, args: HistoryArgs) -> Result<i32> {
    let reporter = Reporter::new(args.json);
    let config = load_config(global)?;
    let ledger = Ledger::new(&config.ledger_path);
    let transactions = ledger.history(args.limit).context("failed to read ledger")?;
    reporter.history(&transactions);
    Ok(exit::SUCCESS)
}
