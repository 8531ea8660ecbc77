use crate::events::Event;
use crate::transaction::Transaction;

/// Reporter aggregates events and produces human or JSON output.
pub struct Reporter {
    events: Vec<Event>,
    json_mode: bool,
}

impl Reporter {
    pub fn new(json_mode: bool) -> Self {
        Self {
            events: Vec::new(),
            json_mode,
        }
    }

    pub fn record(&mut self, event: Event) {
        if self.json_mode {
            // Emit JSON line to stdout
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{}", line);
            }
        } else if let Event::OpFailed { source, error } = &event {
            eprintln!("failed: {}: {}", source.display(), error);
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// One line describing everything recorded so far.
    pub fn summary(&self) -> String {
        let mut moved = 0;
        let mut skipped = 0;
        let mut failed = 0;
        let mut undone = 0;
        let mut cancelled = None;
        for event in &self.events {
            match event {
                Event::OpCompleted { .. } => moved += 1,
                Event::OpSkipped { .. } => skipped += 1,
                Event::OpFailed { .. } => failed += 1,
                Event::TxnUndone { .. } => undone += 1,
                Event::BatchCancelled { processed, total } => cancelled = Some((*processed, *total)),
                Event::BatchCompleted { .. } => {}
            }
        }
        let mut line = format!("{moved} applied, {skipped} skipped, {failed} failed");
        if undone > 0 {
            line.push_str(&format!(", {undone} undone"));
        }
        if let Some((processed, total)) = cancelled {
            line.push_str(&format!(" (cancelled after {processed} of {total})"));
        }
        line
    }

    /// Print the summary in human mode.
    pub fn finish(&self) {
        if !self.json_mode {
            println!("{}", self.summary());
        }
    }

    pub fn history(&self, transactions: &[Transaction]) {
        for tx in transactions {
            if self.json_mode {
                if let Ok(line) = serde_json::to_string(tx) {
                    println!("{}", line);
                }
                continue;
            }
            println!(
                "{}  {}  {:<11}  {} op(s)",
                tx.id,
                tx.timestamp.to_rfc3339(),
                tx.status.to_string(),
                tx.operations.len()
            );
            for op in &tx.operations {
                println!(
                    "    {:?} {} -> {}",
                    op.kind,
                    op.source.display(),
                    op.target.display()
                );
            }
        }
    }
}
