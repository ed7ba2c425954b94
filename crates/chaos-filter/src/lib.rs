//! Chaos Filter - log matching for chaos monitors
//!
//! Turns the raw, ever-growing output of a container into labeled values:
//! - [`LogTail`] hands out only the lines appended since the previous read
//! - [`match_latest`] finds the newest line matching a filter set and
//!   extracts/rewrites its value
//! - [`match_and_archive`] keeps an independent cursor per filter and
//!   snapshots the unconsumed log slice to disk whenever that filter fires
//!
//! # Example
//!
//! ```rust
//! use chaos_filter::{match_latest, FilterSpec, LogFilter, LogTail};
//!
//! let mut tail = LogTail::new();
//! let lines = tail.clean_incremental("a\nb\ncounter: 5\nc\ncounter: 12\n");
//!
//! let filter = LogFilter::new(
//!     "counter",
//!     FilterSpec::literal("counter:").with_extract(r"^.*?counter: (?P<valueToGet>[\d]+)"),
//! );
//! let hit = match_latest(&lines, &[filter]).unwrap();
//! assert_eq!(hit.value, "12");
//! ```

#![warn(unreachable_pub)]

/// Trigger archiving
pub mod archive;
/// Error types
pub mod error;
/// Filter definitions
pub mod filter;
/// Latest-match search
pub mod matcher;
/// Incremental log reader
pub mod tail;

pub use archive::{match_and_archive, write_archive, ArchiveOutcome, ArchiveRecord};
pub use error::{FilterError, PatternField};
pub use filter::{FilterSpec, LogFilter, VALUE_GROUP};
pub use matcher::{match_latest, FilterMatch};
pub use tail::LogTail;
