//! Input discovery and line reading

use crate::error::{IngressError, IngressResult, ParseError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader, Split};

/// One input file; the unit of map-side parallelism
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct InputSource {
    pub path: PathBuf,
}

impl InputSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Display name used in logs
    pub fn name(&self) -> String {
        self.path.display().to_string()
    }

    /// Open the source for line-by-line reading
    ///
    /// Lines come back as raw bytes; pass each through [`decode_line`] so
    /// that one bad line is rejected on its own instead of ending the read.
    pub async fn lines(&self) -> IngressResult<Split<BufReader<fs::File>>> {
        let file = fs::File::open(&self.path).await?;
        Ok(BufReader::new(file).split(b'\n'))
    }
}

/// Strip a trailing `\r` and validate one raw line as UTF-8
pub fn decode_line(bytes: &[u8]) -> Result<&str, ParseError> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    Ok(std::str::from_utf8(bytes)?)
}

/// Expand files and directories into a sorted list of input files
///
/// Directories are scanned recursively. Entries whose name starts with `.`
/// or `_` (markers, temp files) are skipped.
pub async fn scan_inputs(paths: &[PathBuf]) -> IngressResult<Vec<InputSource>> {
    let mut sources = Vec::new();

    for path in paths {
        let metadata = fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IngressError::NotFound(path.display().to_string())
            } else {
                IngressError::Io(e)
            }
        })?;

        if metadata.is_dir() {
            scan_directory_recursive(path, &mut sources).await?;
        } else {
            sources.push(InputSource::new(path.clone()));
        }
    }

    sources.sort();
    sources.dedup();
    Ok(sources)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') || n.starts_with('_'))
}

fn scan_directory_recursive<'a>(
    dir: &'a Path,
    sources: &'a mut Vec<InputSource>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = IngressResult<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_hidden(&path) {
                continue;
            }

            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                scan_directory_recursive(&path, sources).await?;
            } else if metadata.is_file() {
                sources.push(InputSource::new(path));
            }
        }

        Ok(())
    })
}
