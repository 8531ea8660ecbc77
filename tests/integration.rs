use anyhow::Result;
use pretty_assertions::assert_eq;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::tempdir;
use tidytx::{
    CancelFlag, ConflictStrategy, ExecutionStrategy, Ledger, MoveOptions, OperationExecutor,
    OperationKind, PlanExecutor, PlannedKind, PlannedOperation, RenameOptions, TxStatus,
};

fn executor(root: &Path) -> Arc<OperationExecutor> {
    let ledger = Arc::new(Ledger::new(root.join(".tidytx/ledger.json")));
    Arc::new(OperationExecutor::new(ledger))
}

/// Every path under `root` with its size and modification time.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, (bool, u64, SystemTime)> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let meta = entry.metadata().unwrap();
            (
                entry.path().to_path_buf(),
                (meta.is_dir(), meta.len(), meta.modified().unwrap()),
            )
        })
        .collect()
}

#[test]
fn test_move_into_new_folder_scenario() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    let exec = executor(root);
    fs::write(root.join("a.pdf"), b"0123456789")?;

    let result = exec.move_file(
        &root.join("a.pdf"),
        &root.join("Documents"),
        &MoveOptions {
            strategy: ConflictStrategy::Suffix,
            create_target_dir: true,
            dry_run: false,
        },
    );

    assert!(result.success, "{:?}", result.error);
    assert!(root.join("Documents").is_dir());
    assert!(root.join("Documents/a.pdf").exists());
    assert!(!root.join("a.pdf").exists());

    let history = exec.ledger().history(0)?;
    assert_eq!(history.len(), 1);
    let tx = &history[0];
    assert_eq!(tx.status, TxStatus::Committed);
    assert_eq!(tx.operations.len(), 1);
    assert_eq!(tx.operations[0].kind, OperationKind::Move);
    assert_eq!(tx.operations[0].backup, None);
    Ok(())
}

#[test]
fn test_move_then_undo_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    let content: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    fs::write(root.join("photo.raw"), &content)?;

    let tx_id = {
        let exec = executor(root);
        let result = exec.move_file(
            &root.join("photo.raw"),
            &root.join("Pictures/2024"),
            &MoveOptions {
                create_target_dir: true,
                ..Default::default()
            },
        );
        assert!(result.success, "{:?}", result.error);
        result.transaction_id
    };

    // Undo through a fresh ledger, as a later process run would.
    let ledger = Ledger::new(root.join(".tidytx/ledger.json"));
    let undone = ledger.undo(&tx_id)?;
    assert_eq!(undone.status, TxStatus::RolledBack);

    assert_eq!(fs::read(root.join("photo.raw"))?, content);
    assert!(!root.join("Pictures/2024/photo.raw").exists());
    assert_eq!(ledger.get(&tx_id)?.unwrap().status, TxStatus::RolledBack);
    assert!(ledger.undo(&tx_id).is_err());
    Ok(())
}

#[test]
fn test_rename_then_undo_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    let exec = executor(root);
    fs::write(root.join("scan0001.pdf"), "invoice body")?;

    let result = exec.rename_file(
        &root.join("scan0001.pdf"),
        "2024-03 invoice.txt",
        &RenameOptions::default(),
    );
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.target, root.join("2024-03 invoice.pdf"));

    exec.ledger().undo(&result.transaction_id)?;
    assert_eq!(fs::read_to_string(root.join("scan0001.pdf"))?, "invoice body");
    assert!(!result.target.exists());
    Ok(())
}

#[test]
fn test_delete_then_undo_restores_from_trash() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    let exec = executor(root);
    fs::create_dir(root.join("notes"))?;
    fs::write(root.join("notes/todo.md"), "- buy milk")?;

    let result = exec.delete_file(&root.join("notes/todo.md"), &root.join(".trash"))?;
    assert!(result.success, "{:?}", result.error);
    assert!(!root.join("notes/todo.md").exists());
    assert!(result.target.starts_with(root.join(".trash")));

    exec.ledger().undo(&result.transaction_id)?;
    assert_eq!(fs::read_to_string(root.join("notes/todo.md"))?, "- buy milk");
    assert!(!result.target.exists());
    Ok(())
}

#[test]
fn test_extension_is_preserved_for_any_new_extension() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    let exec = executor(root);

    let cases = [
        ("a.pdf", "renamed-a.txt"),
        ("b.jpeg", "renamed-b"),
        ("c.tar.gz", "renamed-c.zip"),
        ("d", "renamed-d.md"),
    ];
    for (source, new_name) in cases {
        let path = root.join(source);
        fs::write(&path, source)?;
        let result = exec.rename_file(&path, new_name, &RenameOptions::default());
        assert!(result.success, "{source}: {:?}", result.error);
        assert_eq!(
            result.target.extension(),
            Path::new(source).extension(),
            "{source} -> {}",
            result.target.display()
        );
        assert!(result.target.exists());
    }
    Ok(())
}

#[test]
fn test_dry_run_leaves_tree_untouched() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join("inbox"))?;
    fs::write(root.join("inbox/a.pdf"), "a")?;
    fs::write(root.join("inbox/b.jpg"), "b")?;
    fs::write(root.join("inbox/c.txt"), "c")?;
    let before = snapshot(root);

    let exec = executor(root);
    let result = exec.move_file(
        &root.join("inbox/a.pdf"),
        &root.join("Documents"),
        &MoveOptions {
            create_target_dir: true,
            dry_run: true,
            ..Default::default()
        },
    );
    assert!(result.success);
    let result = exec.rename_file(
        &root.join("inbox/b.jpg"),
        "holiday.jpg",
        &RenameOptions {
            dry_run: true,
            ..Default::default()
        },
    );
    assert!(result.success);

    let plan = PlanExecutor::new(exec);
    let ops = vec![PlannedOperation::new(
        PlannedKind::Move,
        root.join("inbox/c.txt"),
        root.join("Text/c.txt"),
        "text files",
    )];
    let strategy = ExecutionStrategy {
        dry_run: true,
        ..Default::default()
    };
    let batch = plan.execute_plan(&ops, &strategy, &CancelFlag::new())?;
    assert_eq!(batch.successful, 1);

    assert_eq!(snapshot(root), before);
    Ok(())
}

#[test]
fn test_suffix_conflicts_produce_distinct_files() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    let exec = executor(root);

    let mut ops = Vec::new();
    for i in 0..12 {
        let src_dir = root.join(format!("src{i}"));
        fs::create_dir(&src_dir)?;
        fs::write(src_dir.join("report.txt"), format!("copy {i}"))?;
        ops.push(PlannedOperation::new(
            PlannedKind::Move,
            src_dir.join("report.txt"),
            root.join("Reports/report.txt"),
            "",
        ));
    }

    let strategy = ExecutionStrategy {
        max_concurrency: 6,
        conflict: ConflictStrategy::Suffix,
        ..Default::default()
    };
    let batch = PlanExecutor::new(exec).execute_plan(&ops, &strategy, &CancelFlag::new())?;
    assert_eq!(batch.successful, 12, "{:?}", batch.errors);

    let contents: HashSet<String> = fs::read_dir(root.join("Reports"))?
        .map(|e| fs::read_to_string(e.unwrap().path()).unwrap())
        .collect();
    assert_eq!(contents.len(), 12);
    Ok(())
}

#[test]
fn test_batch_resilience() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    let exec = executor(root);

    let mut ops = Vec::new();
    for i in 0..5 {
        let name = format!("valid{i}.txt");
        fs::write(root.join(&name), "ok")?;
        ops.push(PlannedOperation::new(
            PlannedKind::Move,
            root.join(&name),
            root.join("Sorted").join(&name),
            "",
        ));
    }
    ops.push(PlannedOperation::new(
        PlannedKind::Move,
        root.join("missing.txt"),
        root.join("Sorted/missing.txt"),
        "",
    ));
    fs::write(root.join("named.txt"), "n")?;
    ops.push(PlannedOperation::new(
        PlannedKind::Rename,
        root.join("named.txt"),
        root.join("bad|name.txt"),
        "",
    ));
    ops.push(PlannedOperation::new(PlannedKind::Move, "", root.join("x"), ""));

    let batch = PlanExecutor::new(exec.clone()).execute_plan(
        &ops,
        &ExecutionStrategy::default(),
        &CancelFlag::new(),
    )?;

    assert_eq!(batch.successful, 5);
    assert_eq!(batch.failed, 3);
    assert_eq!(batch.errors.len(), 3);
    assert_eq!(batch.successful + batch.failed + batch.skipped, ops.len());
    assert_eq!(batch.transaction_ids.len(), 5);
    assert!(batch.failed_files.contains_key(&root.join("missing.txt")));
    assert!(batch.failed_files.contains_key(&root.join("named.txt")));
    assert_eq!(exec.ledger().history(0)?.len(), 5);
    Ok(())
}

#[test]
fn test_batch_skips_are_counted() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join("Sorted"))?;
    fs::write(root.join("Sorted/a.txt"), "existing")?;
    fs::write(root.join("a.txt"), "incoming")?;
    fs::write(root.join("b.txt"), "b")?;

    let ops = vec![
        PlannedOperation::new(PlannedKind::Move, root.join("a.txt"), root.join("Sorted/a.txt"), ""),
        PlannedOperation::new(PlannedKind::Move, root.join("b.txt"), root.join("Sorted/b.txt"), ""),
    ];
    let strategy = ExecutionStrategy {
        conflict: ConflictStrategy::Skip,
        ..Default::default()
    };
    let batch = PlanExecutor::new(executor(root)).execute_plan(&ops, &strategy, &CancelFlag::new())?;

    assert_eq!(batch.successful, 1);
    assert_eq!(batch.skipped, 1);
    assert_eq!(batch.failed, 0);
    assert_eq!(fs::read_to_string(root.join("Sorted/a.txt"))?, "existing");
    assert!(root.join("a.txt").exists());
    Ok(())
}

#[test]
fn test_move_without_folder_creation_fails() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::write(root.join("a.txt"), "a")?;
    let ops = vec![PlannedOperation::new(
        PlannedKind::Move,
        root.join("a.txt"),
        root.join("Nowhere/a.txt"),
        "",
    )];
    let strategy = ExecutionStrategy {
        create_target_dir: false,
        ..Default::default()
    };
    let batch = PlanExecutor::new(executor(root)).execute_plan(&ops, &strategy, &CancelFlag::new())?;
    assert_eq!(batch.failed, 1);
    assert!(!root.join("Nowhere").exists());
    assert!(root.join("a.txt").exists());
    Ok(())
}

#[test]
fn test_undo_whole_batch_in_reverse() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    let exec = executor(root);
    let mut ops = Vec::new();
    for name in ["one.txt", "two.txt", "three.txt"] {
        fs::write(root.join(name), name)?;
        ops.push(PlannedOperation::new(
            PlannedKind::Move,
            root.join(name),
            root.join("Archive").join(name),
            "",
        ));
    }
    let batch = PlanExecutor::new(exec.clone()).execute_plan(
        &ops,
        &ExecutionStrategy::default(),
        &CancelFlag::new(),
    )?;
    assert_eq!(batch.successful, 3);

    for id in batch.transaction_ids.iter().rev() {
        exec.ledger().undo(id)?;
    }
    for name in ["one.txt", "two.txt", "three.txt"] {
        assert_eq!(fs::read_to_string(root.join(name))?, name);
    }
    let statuses: Vec<TxStatus> = exec.ledger().history(0)?.into_iter().map(|t| t.status).collect();
    assert_eq!(statuses, vec![TxStatus::RolledBack; 3]);
    Ok(())
}
