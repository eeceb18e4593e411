//! Path containment helpers shared by project resolution and the CLI.

use std::path::Path;

/// Whether `child` is strictly inside `parent` (component-wise, no string
/// prefix tricks — `/p/subx` is not a child of `/p/sub`).
pub fn is_child_path(child: &Path, parent: &Path) -> bool {
    child != parent && child.starts_with(parent)
}

/// The directory to start a config walk from: the path itself if it is a
/// directory, otherwise its parent.
pub fn start_dir(path: &Path) -> &Path {
    if path.is_dir() {
        path
    } else {
        path.parent().unwrap_or(path)
    }
}
