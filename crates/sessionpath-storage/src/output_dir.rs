//! Output directory layout and lifecycle

use crate::error::{StorageError, StorageResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Marker written once every partition has committed
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// `part-r-00007.jsonl`
pub fn partition_file_name(partition: usize) -> String {
    format!("part-r-{:05}.jsonl", partition)
}

/// Make sure `dir` exists and is empty
///
/// With `overwrite` an existing directory is removed first; without it a
/// non-empty directory is refused.
pub fn prepare_output_dir(dir: &Path, overwrite: bool) -> StorageResult<()> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(StorageError::InvalidPath(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let non_empty = fs::read_dir(dir)?.next().is_some();
        if non_empty {
            if !overwrite {
                return Err(StorageError::OutputExists(dir.display().to_string()));
            }
            tracing::info!(path = %dir.display(), "Removing existing output directory");
            fs::remove_dir_all(dir)?;
        }
    }

    fs::create_dir_all(dir)?;
    Ok(())
}

/// Write the `_SUCCESS` marker; returns its path
pub fn write_success_marker(dir: &Path) -> StorageResult<PathBuf> {
    let path = dir.join(SUCCESS_MARKER);
    fs::write(&path, b"")?;
    Ok(path)
}
