//! Mirror folder bookkeeping
//!
//! For every vault folder under one of a rule's mirror roots, the tracker
//! collects the names of the files that must exist locally. After planning
//! it turns those sets into [`MirrorCleanupAction`]s; executing them deletes
//! any local file or sub-folder the vault does not have.

use std::collections::{BTreeMap, BTreeSet};

use super::{LocalPathMapper, MirrorCleanupAction};
use crate::rules::SyncRule;
use crate::vault_path;

#[derive(Debug, Clone)]
struct MirrorEntry {
    remote: String,
    files: BTreeSet<String>,
}

/// Per-rule accumulator of the authoritative file set of mirrored folders.
#[derive(Debug, Clone, Default)]
pub struct MirrorTracker {
    roots: Vec<String>,
    entries: BTreeMap<String, MirrorEntry>,
}

impl MirrorTracker {
    pub fn new(rule: &SyncRule) -> Self {
        Self {
            roots: rule.mirror_roots.clone(),
            entries: BTreeMap::new(),
        }
    }

    /// The deepest mirror root containing `folder`.
    pub fn root_of(&self, folder: &str) -> Option<&str> {
        self.roots
            .iter()
            .filter(|root| vault_path::is_within(folder, root))
            .max_by_key(|root| root.len())
            .map(String::as_str)
    }

    /// Record that `file_name` must exist in `folder`. Ignored outside the
    /// mirror roots.
    pub fn record_file(&mut self, folder: &str, file_name: &str) -> bool {
        if !self.register_folder(folder) {
            return false;
        }
        if let Some(entry) = self.entries.get_mut(&vault_path::key(folder)) {
            entry.files.insert(file_name.to_lowercase());
        }
        true
    }

    /// Make `folder` a mirror entry, possibly with no files. Ignored outside
    /// the mirror roots.
    pub fn register_folder(&mut self, folder: &str) -> bool {
        if self.root_of(folder).is_none() {
            return false;
        }
        self.entries
            .entry(vault_path::key(folder))
            .or_insert_with(|| MirrorEntry {
                remote: folder.to_string(),
                files: BTreeSet::new(),
            });
        true
    }

    pub fn is_entry(&self, folder: &str) -> bool {
        self.entries.contains_key(&vault_path::key(folder))
    }

    /// Add every ancestor of a recorded folder, up to and including its
    /// mirror root, as an entry of its own. Intermediate folders left with
    /// no files are then still visited by cleanup.
    pub fn synthesize_empty_mirrors(&mut self) {
        let recorded: Vec<String> = self.entries.values().map(|e| e.remote.clone()).collect();
        for folder in recorded {
            let Some(root) = self.root_of(&folder).map(str::to_string) else {
                continue;
            };
            let mut current = folder.as_str();
            while let Some(parent) = vault_path::parent(current) {
                if !vault_path::is_within(parent, &root) {
                    break;
                }
                self.register_folder(parent);
                current = parent;
            }
        }
    }

    /// Number of mirror entries collected so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert the collected entries to cleanup actions, parents first.
    pub fn into_actions(self, rule_index: usize, mapper: &LocalPathMapper) -> Vec<MirrorCleanupAction> {
        let mut child_dirs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entry in self.entries.values() {
            if let Some(parent) = vault_path::parent(&entry.remote) {
                child_dirs
                    .entry(vault_path::key(parent))
                    .or_default()
                    .insert(vault_path::file_name(&entry.remote).to_lowercase());
            }
        }

        self.entries
            .into_iter()
            .map(|(key, entry)| MirrorCleanupAction {
                rule_index,
                local_folder: mapper.map_folder(&entry.remote),
                keep_dirs: child_dirs.remove(&key).unwrap_or_default(),
                remote_folder: entry.remote,
                keep_files: entry.files,
            })
            .collect()
    }
}
