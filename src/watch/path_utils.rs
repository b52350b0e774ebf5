// src/watch/path_utils.rs

//! Path helpers for matching watcher events against subscription roots.

use std::path::Path;

/// `path` relative to `root`, with forward slashes.
///
/// Falls back to comparing canonicalized paths, since notify may report a
/// different absolute prefix for the same directory (symlinks,
/// `/private/var` on macOS). `None` if `path` is not under `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(slashed(rel));
    }

    let root_canon = root.canonicalize().ok()?;
    // A deleted file cannot be canonicalized; canonicalize its parent instead.
    let path_canon = match path.canonicalize() {
        Ok(p) => p,
        Err(_) => path.parent()?.canonicalize().ok()?.join(path.file_name()?),
    };

    path_canon.strip_prefix(&root_canon).ok().map(slashed)
}

fn slashed(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}
