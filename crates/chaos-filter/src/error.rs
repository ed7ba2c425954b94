//! Error types for the filter engine

use std::fmt;
use std::path::PathBuf;

/// Which pattern of a filter failed to compile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternField {
    /// The `extractPattern`
    Extract,
    /// The `searchPattern`
    Search,
}

impl fmt::Display for PatternField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extract => f.write_str("extract"),
            Self::Search => f.write_str("search"),
        }
    }
}

/// Filter engine errors
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// A regex failed to compile
    #[error("filter '{label}': invalid {field} pattern: {source}")]
    InvalidPattern {
        /// Filter label
        label: String,
        /// Pattern that failed
        field: PatternField,
        /// Compile error
        #[source]
        source: regex::Error,
    },

    /// Extract pattern compiles but never yields a value
    #[error("filter '{label}': extract pattern has no `valueToGet` group")]
    MissingValueGroup {
        /// Filter label
        label: String,
    },

    /// Archive filter registered without a target directory
    #[error("filter '{label}' has no archive directory")]
    NoArchiveDir {
        /// Filter label
        label: String,
    },

    /// Writing an archive file failed
    #[error("archive io error at {path}: {source}")]
    Archive {
        /// File or directory involved
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
}

impl FilterError {
    /// Create archive IO error for path
    pub fn archive(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }

    /// Label of the filter the error belongs to, if any
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::InvalidPattern { label, .. }
            | Self::MissingValueGroup { label }
            | Self::NoArchiveDir { label } => Some(label),
            Self::Archive { .. } => None,
        }
    }
}
