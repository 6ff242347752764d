//! Mapping vault paths to local paths

use vault_fs::NormalizedPath;

use crate::repository::RemoteFileRecord;
use crate::rules::{FolderMapping, SyncRule};
use crate::vault_path;

/// Maps vault folders of one rule to local folders.
///
/// Base mapping: with an output override root, the path relative to the
/// rule's scope folder is joined onto that root; otherwise the `$` marker is
/// stripped and the rest joined onto the vault root. Folder mappings are
/// then applied in declaration order, each one recomputing from the vault
/// path, so the last applicable mapping wins.
#[derive(Debug, Clone)]
pub struct LocalPathMapper {
    vault_root: NormalizedPath,
    scope_folder: String,
    output_root: Option<NormalizedPath>,
    mappings: Vec<FolderMapping>,
}

impl LocalPathMapper {
    /// Mapper for a folder-scoped rule.
    pub fn new(rule: &SyncRule, vault_root: &NormalizedPath) -> Self {
        Self {
            vault_root: vault_root.clone(),
            scope_folder: rule.scope.clone(),
            output_root: rule.output_root_path(),
            mappings: rule.folder_mappings.clone(),
        }
    }

    /// Use `folder` as the base for override-root mapping. Single-file rules
    /// pass the folder containing their file.
    pub fn with_scope_folder(mut self, folder: impl Into<String>) -> Self {
        self.scope_folder = folder.into();
        self
    }

    pub fn output_root(&self) -> Option<&NormalizedPath> {
        self.output_root.as_ref()
    }

    /// Local folder for a vault folder path.
    pub fn map_folder(&self, remote_folder: &str) -> NormalizedPath {
        let mut local = self.base(remote_folder);

        for mapping in &self.mappings {
            if let Some(rest) = vault_path::strip_folder(remote_folder, &mapping.remote) {
                local = NormalizedPath::new(&mapping.local).join(rest);
            }
        }
        local
    }

    /// Local file path for a vault file.
    pub fn map_file(&self, record: &RemoteFileRecord) -> NormalizedPath {
        self.map_folder(&record.folder_path).join(&record.name)
    }

    /// Local path for an arbitrary vault path (file or folder).
    pub fn map_path(&self, remote: &str) -> NormalizedPath {
        match vault_path::parent(remote) {
            Some(folder) => self.map_folder(folder).join(vault_path::file_name(remote)),
            None => self.map_folder(remote),
        }
    }

    fn base(&self, remote_folder: &str) -> NormalizedPath {
        if let Some(root) = &self.output_root
            && let Some(rest) = vault_path::strip_folder(remote_folder, &self.scope_folder)
        {
            return root.join(rest);
        }
        self.vault_root.join(vault_path::strip_root(remote_folder))
    }
}
