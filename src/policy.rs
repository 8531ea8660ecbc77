use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::model::ConflictStrategy;

/// Outcome of conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Write to this path.
    Target(PathBuf),
    /// Leave the source where it is.
    Skip,
}

/// Answer from an interactive prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    Skip,
    Suffix,
    Overwrite,
}

/// Asks someone what to do about an occupied target.
///
/// Optional: without one, the `prompt` strategy behaves like `suffix`.
pub trait ConflictPrompt: Send + Sync {
    fn choose(&self, target: &Path) -> PromptChoice;
}

/// Picks the final path for a write given a conflict strategy.
#[derive(Clone, Default)]
pub struct ConflictResolver {
    prompt: Option<Arc<dyn ConflictPrompt>>,
}

impl fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("prompt", &self.prompt.is_some())
            .finish()
    }
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(prompt: Arc<dyn ConflictPrompt>) -> Self {
        Self {
            prompt: Some(prompt),
        }
    }

    /// Resolve against what is on disk.
    pub fn resolve(&self, target: &Path, strategy: ConflictStrategy) -> Resolution {
        self.resolve_with(target, strategy, |p| p.exists())
    }

    /// Resolve with a caller-supplied occupancy check.
    pub fn resolve_with<F>(&self, target: &Path, strategy: ConflictStrategy, taken: F) -> Resolution
    where
        F: Fn(&Path) -> bool,
    {
        if !taken(target) {
            return Resolution::Target(target.to_path_buf());
        }
        let resolution = match strategy {
            ConflictStrategy::Skip => Resolution::Skip,
            ConflictStrategy::Overwrite => Resolution::Target(target.to_path_buf()),
            ConflictStrategy::Suffix => Resolution::Target(suffixed(target, &taken)),
            ConflictStrategy::Prompt => match self.prompt.as_deref() {
                Some(prompt) => match prompt.choose(target) {
                    PromptChoice::Skip => Resolution::Skip,
                    PromptChoice::Overwrite => Resolution::Target(target.to_path_buf()),
                    PromptChoice::Suffix => Resolution::Target(suffixed(target, &taken)),
                },
                None => {
                    debug!(dest = %target.display(), "no prompt configured, using suffix");
                    Resolution::Target(suffixed(target, &taken))
                }
            },
        };
        debug!(dest = %target.display(), %strategy, ?resolution, "conflict resolved");
        resolution
    }
}

/// `<stem>_<unix-nanos><.ext>` beside `target`.
///
/// Regenerated only while the candidate is known to be taken in-process.
fn suffixed<F>(target: &Path, taken: &F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let parent = target.parent().unwrap_or_else(|| Path::new(""));
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut stamp = crate::clock::now_nanos();
    loop {
        let candidate = parent.join(format!("{stem}_{stamp}{ext}"));
        if !taken(&candidate) {
            return candidate;
        }
        stamp += 1;
    }
}
