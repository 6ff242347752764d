//! Rule-driven one-way synchronization from a document vault
//!
//! This crate mirrors a subset of a vault onto the local filesystem:
//!
//! - **Rules**: [`SyncRule`] says what to fetch, [`PathMatcher`] decides membership
//! - **Planning**: [`SyncPlanner`] turns rules and the vault listing into a [`SyncPlan`]
//! - **Execution**: [`BatchExecutor`] downloads in batches and performs cleanup
//! - **Retries**: [`RetryDriver`] reruns a failed session on a delay schedule
//!
//! # Architecture
//!
//! ```text
//!   RetryDriver
//!        |
//!   SynchronizationSession
//!        |
//!   SyncPlanner ------------> BatchExecutor
//!   (Matcher, Mapper,         (downloads, deletes,
//!    MirrorTracker,            mirror cleanup,
//!    ChangeDetector)           commands, folders)
//!        \                     /
//!         Repository / vault-fs
//! ```
//!
//! # Example
//!
//! ```ignore
//! use vault_core::{DirectoryRepository, RetryDriver, SessionConfig, SyncRule,
//!     SyncStateFile, SynchronizationSession, TracingProgress};
//!
//! let repository = DirectoryRepository::new("/srv/vault-export");
//! let state = SyncStateFile::new("/var/lib/vault-sync/state.toml");
//! let rules = vec![SyncRule::new("$/Designs")];
//! let session = SynchronizationSession::new(
//!     &repository, &TracingProgress, &state, rules, SessionConfig::new("/work/vault"));
//! let result = RetryDriver::new(3).run(|_| session.run())?;
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod plan;
pub mod preflight;
pub mod progress;
pub mod repository;
pub mod rules;
pub mod state;
pub mod sync;
pub mod vault_path;

pub use cancel::CancellationToken;
pub use config::SyncConfig;
pub use error::{Classify, Error, ErrorClass, Result};
pub use plan::{
    ChangeDetector, DeleteAction, DeleteReason, DownloadAction, FolderCreateAction, LocalPathMapper,
    MirrorCleanupAction, MirrorTracker, PlannerOptions, SyncPlan, SyncPlanner,
};
pub use progress::{ProgressSink, TracingProgress};
pub use repository::{
    DirectoryRepository, DownloadItem, FolderId, LastRelevantVersion, MasterId, RemoteFileRecord, RemoteFolder,
    RepoResult, Repository, RepositoryError,
};
pub use rules::{FolderMapping, LifecycleFilter, PathMatcher, SyncRule};
pub use state::{StateStore, SyncStateFile};
pub use sync::{
    BatchExecutor, CommandRunner, ExecutorOptions, ProcessRunner, RetryDriver, RunResult, SessionConfig,
    SynchronizationSession,
};
