//! A repository backed by a plain directory tree.
//!
//! Serves a vault that has been exported (or mounted) to a local or network
//! directory: `$` maps to the directory root, sub-folders map one-to-one.
//! There is no version history, so every file has exactly one version and
//! no lifecycle state, and files have no structural children. A lifecycle
//! filter naming allowed states therefore selects nothing.

use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use vault_fs::checksum::{checksums_match, compute_file_checksum};
use vault_fs::{NormalizedPath, RobustnessConfig, io};

use super::{
    DownloadItem, FolderId, LastRelevantVersion, MasterId, RemoteFileRecord, RemoteFolder, RepoResult,
    Repository, RepositoryError,
};
use crate::vault_path;

/// Repository serving files from a directory that mirrors the vault layout.
#[derive(Debug)]
pub struct DirectoryRepository {
    root: NormalizedPath,
    robustness: RobustnessConfig,
    /// Vault path of every file handed out so far, by id
    seen: Mutex<HashMap<MasterId, String>>,
}

impl DirectoryRepository {
    pub fn new(root: impl Into<NormalizedPath>) -> Self {
        Self {
            root: root.into(),
            robustness: RobustnessConfig::default(),
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_robustness(mut self, robustness: RobustnessConfig) -> Self {
        self.robustness = robustness;
        self
    }

    /// Directory this repository serves from.
    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    fn local_for(&self, vault: &str) -> NormalizedPath {
        self.root.join(vault_path::strip_root(vault))
    }

    fn folder(&self, path: &str) -> RemoteFolder {
        RemoteFolder {
            id: FolderId(stable_id(path)),
            path: path.to_string(),
        }
    }

    fn record(&self, folder_path: &str, name: &str) -> RepoResult<RemoteFileRecord> {
        let local = self.local_for(&vault_path::join(folder_path, name));
        let checksum = compute_file_checksum(&local.to_native())
            .map_err(|e| vault_fs::Error::io(local.to_native(), e))?;
        let last_modified = fs::metadata(local.to_native())
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let full = vault_path::join(folder_path, name);
        let master_id = MasterId(stable_id(&full));
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(master_id, full);
        }

        Ok(RemoteFileRecord {
            master_id,
            folder_path: folder_path.to_string(),
            name: name.to_string(),
            checksum,
            lifecycle_state: None,
            last_modified,
        })
    }

    fn walk(
        &self,
        folder_path: &str,
        recursive: bool,
        files: &mut Vec<RemoteFileRecord>,
        folders: &mut Vec<RemoteFolder>,
    ) -> RepoResult<()> {
        let entries = io::list_dir(&self.local_for(folder_path), self.robustness)?;
        for entry in entries.iter().filter(|e| !e.is_dir) {
            files.push(self.record(folder_path, &entry.name)?);
        }
        for entry in entries.iter().filter(|e| e.is_dir) {
            let child = vault_path::join(folder_path, &entry.name);
            folders.push(self.folder(&child));
            if recursive {
                self.walk(&child, true, files, folders)?;
            }
        }
        Ok(())
    }

    fn fetch(&self, item: &DownloadItem) -> RepoResult<bool> {
        let source = self.local_for(&item.record.full_path());
        if let Some(parent) = item.target.parent() {
            io::create_dir_all(&parent, self.robustness)?;
        }
        let (src, dst) = (source.to_native(), item.target.to_native());
        self.robustness
            .retry("copy", || fs::copy(&src, &dst))
            .map_err(|e| vault_fs::Error::io(&src, e))?;

        let written = compute_file_checksum(&dst).map_err(|e| vault_fs::Error::io(&dst, e))?;
        Ok(checksums_match(&written, &item.record.checksum))
    }
}

/// Deterministic 63-bit id derived from a case-folded vault path.
fn stable_id(path: &str) -> i64 {
    let digest = Sha256::digest(vault_path::key(path).as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(bytes) >> 1) as i64
}

impl Repository for DirectoryRepository {
    fn find_folder(&self, path: &str) -> RepoResult<Option<RemoteFolder>> {
        if self.local_for(path).is_dir() {
            Ok(Some(self.folder(path)))
        } else {
            Ok(None)
        }
    }

    fn find_file(&self, folder: &RemoteFolder, name: &str) -> RepoResult<Option<RemoteFileRecord>> {
        let local = self.local_for(&vault_path::join(&folder.path, name));
        if !local.is_file() {
            return Ok(None);
        }
        self.record(&folder.path, name).map(Some)
    }

    fn list_files(&self, folder: &RemoteFolder, recursive: bool) -> RepoResult<Vec<RemoteFileRecord>> {
        let (mut files, mut folders) = (Vec::new(), Vec::new());
        self.walk(&folder.path, recursive, &mut files, &mut folders)?;
        Ok(files)
    }

    fn list_folders(&self, folder: &RemoteFolder, recursive: bool) -> RepoResult<Vec<RemoteFolder>> {
        let (mut files, mut folders) = (Vec::new(), Vec::new());
        self.walk(&folder.path, recursive, &mut files, &mut folders)?;
        Ok(folders)
    }

    fn children(&self, _master_id: MasterId) -> RepoResult<Vec<RemoteFileRecord>> {
        Ok(Vec::new())
    }

    fn last_relevant_version(
        &self,
        master_id: MasterId,
        allowed_states: &[String],
        _obsolete_states: &[String],
    ) -> RepoResult<LastRelevantVersion> {
        // stateless versions are never obsolete and only pass an open filter
        if !allowed_states.is_empty() {
            debug!(id = %master_id, "exported files carry no lifecycle state");
            return Ok(LastRelevantVersion::None);
        }
        let path = self
            .seen
            .lock()
            .map_err(|_| RepositoryError::Other {
                message: "file index poisoned".to_string(),
            })?
            .get(&master_id)
            .cloned();
        let Some(path) = path else {
            return Ok(LastRelevantVersion::None);
        };
        let (folder, name) = vault_path::split(&path);
        if !self.local_for(&path).is_file() {
            return Ok(LastRelevantVersion::None);
        }
        self.record(folder, name).map(LastRelevantVersion::Version)
    }

    fn download_batch(&self, items: &[DownloadItem]) -> RepoResult<Vec<MasterId>> {
        let mut failed = Vec::new();
        for item in items {
            match self.fetch(item) {
                Ok(true) => debug!(file = %item.record.full_path(), to = %item.target, "copied"),
                Ok(false) => {
                    warn!(file = %item.record.full_path(), "checksum mismatch after copy");
                    failed.push(item.record.master_id);
                }
                Err(e) => {
                    warn!(file = %item.record.full_path(), error = %e, "copy failed");
                    failed.push(item.record.master_id);
                }
            }
        }
        Ok(failed)
    }

    fn local_checksum(&self, path: &NormalizedPath) -> RepoResult<String> {
        compute_file_checksum(&path.to_native())
            .map_err(|e| RepositoryError::Local(vault_fs::Error::io(path.to_native(), e)))
    }
}
