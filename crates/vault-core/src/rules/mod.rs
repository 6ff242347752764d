//! Synchronization rules and path matching
//!
//! A [`SyncRule`] is one configured unit of work; [`PathMatcher`] decides
//! which vault paths fall inside it.

mod matcher;
mod rule;

pub use matcher::PathMatcher;
pub use rule::{FOLDER_PATTERN, FolderMapping, LifecycleFilter, SyncRule};
