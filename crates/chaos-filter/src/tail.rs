//! Shared "tail since last read" cursor

/// Incremental reader over a cumulative log
///
/// Each call returns the lines appended since the previous call, with
/// carriage returns stripped.
#[derive(Debug, Clone, Default)]
pub struct LogTail {
    cursor: usize,
}

impl LogTail {
    /// Reader at the start of the log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of the cleaned log consumed so far
    #[inline]
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Lines beyond the cursor; the cursor then moves to the end of the log,
    /// back to a shorter length if the log shrank
    pub fn clean_incremental(&mut self, full_log: &str) -> Vec<String> {
        let cleaned = full_log.replace('\r', "");
        let lines = cleaned
            .get(self.cursor..)
            .unwrap_or_default()
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();
        self.cursor = cleaned.len();
        lines
    }
}
