//! Newest-match-wins scanning over a batch of lines

use crate::filter::LogFilter;

/// A filter hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMatch {
    /// Label of the filter that fired
    pub label: String,
    /// The raw line that matched
    pub line: String,
    /// Extracted (and rewritten) value; the raw line for boolean filters
    pub value: String,
}

/// Find the newest line matching the first filter that matches at all
///
/// Filters are tried in declaration order. Within a filter, lines are
/// scanned from the end so the most recent occurrence wins. A filter whose
/// patterns fail to compile is logged and skipped.
pub fn match_latest<S: AsRef<str>>(lines: &[S], filters: &[LogFilter]) -> Option<FilterMatch> {
    for filter in filters {
        let compiled = match filter.compile() {
            Ok(compiled) => compiled,
            Err(err) => {
                tracing::warn!(filter = filter.label(), error = %err, "skipping filter");
                continue;
            }
        };

        let hit = lines
            .iter()
            .rev()
            .map(AsRef::as_ref)
            .find(|line| filter.admits(line));

        if let Some(line) = hit {
            return Some(FilterMatch {
                label: filter.label().to_string(),
                line: line.to_string(),
                value: compiled.apply(line),
            });
        }
    }
    None
}
