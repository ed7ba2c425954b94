//! Filter rules
//!
//! A filter is a literal gate plus an optional extract/rewrite chain:
//! - `match_literal` decides whether a line is considered at all
//! - `extract_pattern` replaces the line with its `valueToGet` capture
//! - `search_pattern`/`replace_pattern` rewrite the extracted value
//!
//! Patterns are compiled when a filter is evaluated, so a broken pattern
//! only disables that one filter.

use crate::error::{FilterError, PatternField};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Named capture group an extract pattern must expose
pub const VALUE_GROUP: &str = "valueToGet";

/// Registration payload for a filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Substring a line must contain to be considered
    pub match_literal: String,
    /// Regex with a `valueToGet` group; empty means a boolean filter
    #[serde(default)]
    pub extract_pattern: String,
    /// Optional regex applied to the extracted value
    #[serde(default)]
    pub search_pattern: Option<String>,
    /// Replacement for `search_pattern` matches
    #[serde(default)]
    pub replace_pattern: Option<String>,
}

impl FilterSpec {
    /// Boolean filter on a literal
    #[inline]
    #[must_use]
    pub fn literal(match_literal: impl Into<String>) -> Self {
        Self {
            match_literal: match_literal.into(),
            ..Self::default()
        }
    }

    /// With extract pattern
    #[inline]
    #[must_use]
    pub fn with_extract(mut self, pattern: impl Into<String>) -> Self {
        self.extract_pattern = pattern.into();
        self
    }

    /// With search/replace rewrite of the extracted value
    #[inline]
    #[must_use]
    pub fn with_rewrite(mut self, search: impl Into<String>, replace: impl Into<String>) -> Self {
        self.search_pattern = Some(search.into());
        self.replace_pattern = Some(replace.into());
        self
    }
}

/// A labeled filter with its own archive cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    label: String,
    spec: FilterSpec,
    archive_dir: Option<PathBuf>,
    cursor: usize,
}

impl LogFilter {
    /// Create new filter
    #[must_use]
    pub fn new(label: impl Into<String>, spec: FilterSpec) -> Self {
        Self {
            label: label.into(),
            spec,
            archive_dir: None,
            cursor: 0,
        }
    }

    /// Archive unconsumed log slices into `dir` when this filter fires
    #[must_use]
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    /// Name used in logs and archive records
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Registration payload
    #[inline]
    #[must_use]
    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// Archive directory, if this is an archive trigger
    #[inline]
    #[must_use]
    pub fn archive_dir(&self) -> Option<&Path> {
        self.archive_dir.as_deref()
    }

    /// Bytes of the cumulative log already consumed by this filter
    #[inline]
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// True when the filter only answers match/no-match
    #[inline]
    #[must_use]
    pub fn is_boolean(&self) -> bool {
        self.spec.extract_pattern.is_empty()
    }

    /// Literal gate
    #[inline]
    #[must_use]
    pub fn admits(&self, line: &str) -> bool {
        line.contains(self.spec.match_literal.as_str())
    }

    /// Check that every pattern compiles
    ///
    /// # Errors
    /// Same as evaluation would report for this filter.
    pub fn validate(&self) -> Result<(), FilterError> {
        self.compile().map(|_| ())
    }

    /// Compile the extract/rewrite chain
    pub(crate) fn compile(&self) -> Result<CompiledPatterns, FilterError> {
        if self.is_boolean() {
            return Ok(CompiledPatterns::default());
        }

        let extract = Regex::new(&self.spec.extract_pattern).map_err(|source| {
            FilterError::InvalidPattern {
                label: self.label.clone(),
                field: PatternField::Extract,
                source,
            }
        })?;
        if !extract.capture_names().flatten().any(|name| name == VALUE_GROUP) {
            return Err(FilterError::MissingValueGroup {
                label: self.label.clone(),
            });
        }

        let search = match self.spec.search_pattern.as_deref() {
            Some(pattern) if !pattern.is_empty() => {
                Some(Regex::new(pattern).map_err(|source| FilterError::InvalidPattern {
                    label: self.label.clone(),
                    field: PatternField::Search,
                    source,
                })?)
            }
            _ => None,
        };

        Ok(CompiledPatterns {
            extract: Some(extract),
            search,
            replace: self.spec.replace_pattern.clone().unwrap_or_default(),
        })
    }

    /// Move the archive cursor forward; never backward
    pub(crate) fn advance_cursor(&mut self, to: usize) {
        self.cursor = self.cursor.max(to);
    }
}

/// Compiled extract/rewrite chain of one filter
#[derive(Debug, Default)]
pub(crate) struct CompiledPatterns {
    extract: Option<Regex>,
    search: Option<Regex>,
    replace: String,
}

impl CompiledPatterns {
    /// Value carried by a line that passed the literal gate
    pub(crate) fn apply(&self, line: &str) -> String {
        let Some(extract) = &self.extract else {
            return line.to_string();
        };
        let value = extract.replace_all(line, "${valueToGet}");
        match &self.search {
            Some(search) => search.replace_all(&value, self.replace.as_str()).into_owned(),
            None => value.into_owned(),
        }
    }
}
