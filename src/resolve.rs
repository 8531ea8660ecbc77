use std::path::{Component, Path, PathBuf};

use path_absolutize::Absolutize;

use crate::error::{Error, IoContext, Result};

/// Lexically clean a path and make it absolute. Does not touch the disk.
pub fn clean_path(dir: &Path) -> Result<PathBuf> {
    let cleaned = dir
        .absolutize()
        .io_context(|| format!("cannot resolve {}", dir.display()))?;
    Ok(cleaned.into_owned())
}

/// Join `name` onto an already clean `base`, refusing anything that leaves it.
pub fn confined_join(base: &Path, name: &Path) -> Result<PathBuf> {
    let traversal = || Error::PathTraversal {
        path: base.join(name),
        base: base.to_path_buf(),
    };
    if name
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(traversal());
    }
    let joined = base
        .join(name)
        .absolutize()
        .io_context(|| format!("cannot resolve {}", name.display()))?
        .into_owned();
    if joined == base || !joined.starts_with(base) {
        return Err(traversal());
    }
    Ok(joined)
}
