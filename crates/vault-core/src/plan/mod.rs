//! Planning: turning rules and a vault listing into a [`SyncPlan`]
//!
//! Planning never mutates the local filesystem. It reads (existence checks
//! and local checksums) and produces an ordered list of actions that the
//! executor applies later.

mod change;
mod mapper;
mod mirror;
mod planner;

pub use change::ChangeDetector;
pub use mapper::LocalPathMapper;
pub use mirror::MirrorTracker;
pub use planner::{PlannerOptions, SyncPlanner};

use std::collections::BTreeSet;

use serde::Serialize;
use vault_fs::NormalizedPath;

use crate::repository::{MasterId, RemoteFileRecord};

/// Fetch one vault file to a local destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadAction {
    /// Index of the rule that claimed the file
    pub rule_index: usize,
    pub record: RemoteFileRecord,
    /// Final local location
    #[serde(serialize_with = "serialize_path")]
    pub destination: NormalizedPath,
    /// Temp location the repository writes to when the rule stages downloads
    #[serde(serialize_with = "serialize_opt_path")]
    pub staging: Option<NormalizedPath>,
    pub writable: bool,
    /// Execute the file once it is in place
    pub run_after: bool,
    pub component: Option<String>,
}

impl DownloadAction {
    /// Where the repository should write the bytes.
    pub fn target(&self) -> &NormalizedPath {
        self.staging.as_ref().unwrap_or(&self.destination)
    }

    pub fn master_id(&self) -> MasterId {
        self.record.master_id
    }
}

/// Make sure a local folder exists even if no file lands in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderCreateAction {
    pub rule_index: usize,
    #[serde(serialize_with = "serialize_path")]
    pub path: NormalizedPath,
}

/// Remove everything in a local folder that the vault no longer has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorCleanupAction {
    pub rule_index: usize,
    /// Vault folder this entry mirrors
    pub remote_folder: String,
    #[serde(serialize_with = "serialize_path")]
    pub local_folder: NormalizedPath,
    /// Lower-cased names of the files that must survive
    pub keep_files: BTreeSet<String>,
    /// Lower-cased names of sub-folders that are mirror entries themselves
    pub keep_dirs: BTreeSet<String>,
}

/// Why a path is scheduled for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteReason {
    /// Listed in the rule's `delete_paths`
    Configured,
    /// The file's lifecycle state marks it obsolete
    Obsolete,
}

/// Delete a local file or folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteAction {
    pub rule_index: usize,
    #[serde(serialize_with = "serialize_path")]
    pub path: NormalizedPath,
    pub reason: DeleteReason,
}

/// Everything a run is going to do, in execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncPlan {
    /// Number of rules the plan was built from
    pub rule_count: usize,
    pub downloads: Vec<DownloadAction>,
    pub folders: Vec<FolderCreateAction>,
    pub mirrors: Vec<MirrorCleanupAction>,
    pub deletes: Vec<DeleteAction>,
    /// Files that passed the rule filters
    pub considered: usize,
    /// Files whose local copy already matches the vault
    pub up_to_date: usize,
    /// Per-rule and per-file problems met while planning
    pub errors: Vec<String>,
}

impl SyncPlan {
    /// Whether executing the plan would change nothing locally, apart from
    /// mirror cleanups that find nothing to delete.
    pub fn is_empty(&self) -> bool {
        self.downloads.is_empty() && self.folders.is_empty() && self.deletes.is_empty()
    }

    /// Downloads that are staged in a temp location.
    pub fn staged(&self) -> impl Iterator<Item = &DownloadAction> {
        self.downloads.iter().filter(|d| d.staging.is_some())
    }

    pub fn deletes_for(&self, rule_index: usize) -> impl Iterator<Item = &DeleteAction> {
        self.deletes.iter().filter(move |d| d.rule_index == rule_index)
    }

    pub fn mirrors_for(&self, rule_index: usize) -> impl Iterator<Item = &MirrorCleanupAction> {
        self.mirrors.iter().filter(move |m| m.rule_index == rule_index)
    }

    pub fn folders_for(&self, rule_index: usize) -> impl Iterator<Item = &FolderCreateAction> {
        self.folders.iter().filter(move |f| f.rule_index == rule_index)
    }

    pub fn downloads_for(&self, rule_index: usize) -> impl Iterator<Item = &DownloadAction> {
        self.downloads.iter().filter(move |d| d.rule_index == rule_index)
    }
}

fn serialize_path<S: serde::Serializer>(path: &NormalizedPath, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(path.as_str())
}

fn serialize_opt_path<S: serde::Serializer>(path: &Option<NormalizedPath>, s: S) -> Result<S::Ok, S::Error> {
    match path {
        Some(p) => s.serialize_some(p.as_str()),
        None => s.serialize_none(),
    }
}
