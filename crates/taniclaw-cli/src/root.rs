use std::path::{Path, PathBuf};

use taniclaw_core::paths::TANICLAW_DIR;

/// Resolve the project root.
///
/// `--root` / `TANICLAW_ROOT` wins. Otherwise walk upward from the cwd for a
/// `.taniclaw/` directory, falling back to the cwd itself.
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_marked_ancestor(&cwd).unwrap_or(cwd)
}

fn find_marked_ancestor(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(TANICLAW_DIR).is_dir())
        .map(Path::to_path_buf)
}
