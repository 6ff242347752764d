//! Local filesystem layer for vault-sync
//!
//! Provides forward-slash normalized paths, content checksums, retrying I/O
//! primitives and format-agnostic configuration loading.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod path;

pub use config::{ConfigDocument, ConfigFormat};
pub use error::{Error, Result};
pub use io::{LocalEntry, RobustnessConfig};
pub use path::NormalizedPath;
