//! Resume support
//!
//! There is no checkpoint file: the canonical output path of a task is its
//! completion marker. Outputs are only ever created by renaming a fully
//! written staging file, so existence implies completeness.

use std::path::Path;

pub mod lock;

pub use lock::RunLock;

/// Whether the canonical output at `path` already exists
pub fn is_complete(path: &Path) -> bool {
    path.is_file()
}
