//! Atomic file writer: all-or-nothing publication of a file

use crate::error::{StorageError, StorageResult};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes to a hidden temporary file next to the target and renames it
/// into place on commit. Dropping without commit removes the temp file and
/// leaves any previous version of the target untouched.
pub struct AtomicWriter {
    temp_path: PathBuf,
    final_path: PathBuf,
    file: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl AtomicWriter {
    /// Create a new atomic writer for the given path
    pub fn new<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let final_path = path.as_ref().to_path_buf();

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = Self::temp_path(&final_path)?;
        let file = File::create(&temp_path)?;

        Ok(Self {
            temp_path,
            final_path,
            file: Some(BufWriter::new(file)),
            bytes_written: 0,
        })
    }

    /// Write data to the temporary file
    pub fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::Write("writer already closed".to_string()))?;
        file.write_all(data)?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Flush, sync and rename the temp file over the final path
    ///
    /// On any failure the temp file is removed and the target is left as it
    /// was.
    pub fn commit(mut self) -> StorageResult<u64> {
        let writer = self
            .file
            .take()
            .ok_or_else(|| StorageError::Write("writer already closed".to_string()))?;

        if let Err(e) = Self::publish(writer, &self.temp_path, &self.final_path) {
            let _ = fs::remove_file(&self.temp_path);
            return Err(e);
        }
        Ok(self.bytes_written)
    }

    fn publish(writer: BufWriter<File>, temp_path: &Path, final_path: &Path) -> StorageResult<()> {
        let file = writer
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);
        fs::rename(temp_path, final_path)?;
        Ok(())
    }

    /// `dir/.name.tmp`, hidden so input scans and listings skip it
    fn temp_path(final_path: &Path) -> StorageResult<PathBuf> {
        let name = final_path
            .file_name()
            .ok_or_else(|| StorageError::InvalidPath(final_path.display().to_string()))?;
        let mut temp_name = std::ffi::OsString::from(".");
        temp_name.push(name);
        temp_name.push(".tmp");
        Ok(final_path.with_file_name(temp_name))
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        // Not committed: discard the partial file
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}
