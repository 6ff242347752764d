//! Shared test fixtures for the vault-sync workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`memory`]: [`MemoryRepository`], an in-memory vault with fault injection
//! - [`recording`]: recording progress sink, command runner and state store
//! - [`tree`]: [`LocalTree`], a temporary local root with file helpers

pub mod memory;
pub mod recording;
pub mod tree;

pub use memory::MemoryRepository;
pub use recording::{MemoryStateStore, RecordingProgress, RecordingRunner};
pub use tree::LocalTree;
