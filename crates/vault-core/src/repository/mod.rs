//! The vault repository collaborator
//!
//! The engine never talks to a vault server directly. Everything it needs
//! (folder and file lookups, listings, structural children, version history,
//! bulk download and local checksums) goes through the [`Repository`] trait.
//! Connection management (login/logout) belongs to whoever constructs the
//! implementation.

mod directory;

pub use directory::DirectoryRepository;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vault_fs::NormalizedPath;

use crate::error::{Classify, ErrorClass};
use crate::vault_path;

/// Stable identity of a vault file across all of its versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MasterId(pub i64);

impl fmt::Display for MasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a vault folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(pub i64);

/// A folder as reported by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolder {
    pub id: FolderId,
    /// Full vault path, e.g. `$/Designs/Sub`
    pub path: String,
}

/// One version of a vault file as reported by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileRecord {
    pub master_id: MasterId,
    /// Vault path of the containing folder
    pub folder_path: String,
    pub name: String,
    /// Content checksum of this version
    pub checksum: String,
    /// Lifecycle state name of this version, if the vault tracks one
    pub lifecycle_state: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl RemoteFileRecord {
    /// Full vault path of the file.
    pub fn full_path(&self) -> String {
        vault_path::join(&self.folder_path, &self.name)
    }
}

/// Result of walking a file's version history against a lifecycle filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastRelevantVersion {
    /// The newest version whose state is allowed
    Version(RemoteFileRecord),
    /// The file's latest relevant state is a disallowed one; local copies
    /// should be removed
    Obsolete,
    /// No version ever reached an allowed state
    None,
}

/// A single file to fetch in a bulk download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadItem {
    pub record: RemoteFileRecord,
    /// Where the repository must write the bytes
    pub target: NormalizedPath,
}

/// Errors reported by a [`Repository`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Not found in vault: {path}")]
    NotFound { path: String },

    #[error("Repository unavailable: {message}")]
    Transient { message: String },

    #[error("Repository error: {message}")]
    Other { message: String },

    #[error(transparent)]
    Local(#[from] vault_fs::Error),
}

impl RepositoryError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Whether an immediate repeat of the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Local(_))
    }
}

impl Classify for RepositoryError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Authentication { .. } | Self::NotFound { .. } => ErrorClass::Fatal,
            Self::Transient { .. } | Self::Other { .. } | Self::Local(_) => ErrorClass::Retryable,
        }
    }
}

/// Result type for repository calls
pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// Capability the engine needs from a vault.
///
/// Absence is not an error: lookups return `Ok(None)` when a path does not
/// exist.
pub trait Repository: Send + Sync {
    /// Look up a folder by its full vault path.
    fn find_folder(&self, path: &str) -> RepoResult<Option<RemoteFolder>>;

    /// Look up the latest version of a file inside a folder.
    fn find_file(&self, folder: &RemoteFolder, name: &str) -> RepoResult<Option<RemoteFileRecord>>;

    /// Latest versions of the files in a folder, optionally recursing.
    fn list_files(&self, folder: &RemoteFolder, recursive: bool) -> RepoResult<Vec<RemoteFileRecord>>;

    /// Sub-folders of a folder, optionally recursing. The folder itself is
    /// not included.
    fn list_folders(&self, folder: &RemoteFolder, recursive: bool) -> RepoResult<Vec<RemoteFolder>>;

    /// Transitive structural children of a file (e.g. assembly components).
    fn children(&self, master_id: MasterId) -> RepoResult<Vec<RemoteFileRecord>>;

    /// Walk the version history of a file and pick the newest version in an
    /// allowed state, or report it obsolete.
    fn last_relevant_version(
        &self,
        master_id: MasterId,
        allowed_states: &[String],
        obsolete_states: &[String],
    ) -> RepoResult<LastRelevantVersion>;

    /// Download and verify a batch of files. Returns the ids that failed;
    /// an `Err` means the whole batch failed.
    fn download_batch(&self, items: &[DownloadItem]) -> RepoResult<Vec<MasterId>>;

    /// Checksum of a local file in the same form as
    /// [`RemoteFileRecord::checksum`].
    fn local_checksum(&self, path: &NormalizedPath) -> RepoResult<String>;
}
