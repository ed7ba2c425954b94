//! Per-filter trigger archiving
//!
//! Every archive filter tails the same cumulative log with its own cursor.
//! When a filter fires inside its unconsumed slice, that slice is written to
//! `<dir>/log.<N>.log` (N = files already in `dir`) and the cursor jumps to
//! the end of the log. Cursors are offsets into the raw output bytes, which
//! need not be valid UTF-8; only matching sees a lossy decoding.

use crate::error::FilterError;
use crate::filter::LogFilter;
use crate::matcher::match_latest;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// One archive file written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    /// Filter that triggered the write
    pub label: String,
    /// File written
    pub path: PathBuf,
    /// Bytes written
    pub bytes: usize,
}

/// Result of one archiving pass
#[derive(Debug, Default)]
pub struct ArchiveOutcome {
    /// Files written this pass
    pub archived: Vec<ArchiveRecord>,
    /// Filters that could not be archived; their cursors did not move
    pub failures: Vec<FilterError>,
}

impl ArchiveOutcome {
    /// No filter failed this pass
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Scan each filter's unconsumed slice and archive it on a match
pub fn match_and_archive(full_log: &[u8], filters: &mut [LogFilter]) -> ArchiveOutcome {
    let mut outcome = ArchiveOutcome::default();

    for filter in filters.iter_mut() {
        let Some(dir) = filter.archive_dir().map(Path::to_path_buf) else {
            outcome.failures.push(FilterError::NoArchiveDir {
                label: filter.label().to_string(),
            });
            continue;
        };

        // A log shorter than the cursor has nothing unconsumed
        let Some(pending) = full_log.get(filter.cursor()..) else {
            continue;
        };
        if pending.is_empty() {
            continue;
        }

        let text = String::from_utf8_lossy(pending);
        let lines: Vec<&str> = text
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .collect();
        if match_latest(&lines, std::slice::from_ref(filter)).is_none() {
            continue;
        }

        match write_archive(&dir, pending) {
            Ok(path) => {
                tracing::debug!(
                    filter = filter.label(),
                    path = %path.display(),
                    bytes = pending.len(),
                    "archived log slice"
                );
                outcome.archived.push(ArchiveRecord {
                    label: filter.label().to_string(),
                    path,
                    bytes: pending.len(),
                });
                filter.advance_cursor(full_log.len());
            }
            Err(err) => {
                tracing::warn!(filter = filter.label(), error = %err, "archive write failed");
                outcome.failures.push(err);
            }
        }
    }

    outcome
}

/// Write `bytes` to the next free `log.<N>.log` in `dir`
///
/// # Errors
/// `FilterError::Archive` if the directory cannot be created or listed, or
/// the file cannot be written.
pub fn write_archive(dir: &Path, bytes: &[u8]) -> Result<PathBuf, FilterError> {
    fs::create_dir_all(dir).map_err(|e| FilterError::archive(dir, e))?;

    let mut index = count_files(dir)?;
    loop {
        let path = dir.join(format!("log.{index}.log"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(bytes)
                    .map_err(|e| FilterError::archive(&path, e))?;
                return Ok(path);
            }
            // Numbering has a gap; take the next free slot
            Err(e) if e.kind() == ErrorKind::AlreadyExists => index += 1,
            Err(e) => return Err(FilterError::archive(&path, e)),
        }
    }
}

fn count_files(dir: &Path) -> Result<usize, FilterError> {
    let mut count = 0;
    for entry in fs::read_dir(dir).map_err(|e| FilterError::archive(dir, e))? {
        let entry = entry.map_err(|e| FilterError::archive(dir, e))?;
        if entry.path().is_file() {
            count += 1;
        }
    }
    Ok(count)
}
