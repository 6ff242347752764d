//! Rule type for synchronization configuration
//!
//! A rule names a vault scope (a folder or a single file) and says how the
//! files under it are selected, where they land locally and how the local
//! copy is maintained. Rules are immutable during a run; everything
//! accumulated while planning lives in the plan.

use serde::{Deserialize, Serialize};
use vault_fs::NormalizedPath;

use crate::error::{Error, Result};
use crate::vault_path;

/// Extension pattern selecting whole folders instead of individual files.
pub const FOLDER_PATTERN: &str = "/";

/// Lifecycle gate applied before a file is considered for download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleFilter {
    /// States whose versions may be downloaded (e.g. "Released"). Empty
    /// admits any state, including none.
    #[serde(default)]
    pub allowed: Vec<String>,
    /// States that mark a file as withdrawn; local copies are deleted
    #[serde(default)]
    pub obsolete: Vec<String>,
}

/// Explicit remote-folder to local-folder override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderMapping {
    pub remote: String,
    pub local: String,
}

/// One configured synchronization unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRule {
    /// Vault folder or file this rule covers, e.g. `$/Designs`
    pub scope: String,

    /// Case-insensitive substrings of the full vault path to skip
    #[serde(default)]
    pub exclude: Vec<String>,

    /// File-name suffixes to include (`.iam`); `["/"]` selects whole folders
    #[serde(default)]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub lifecycle: Option<LifecycleFilter>,

    #[serde(default)]
    pub recursive: bool,

    /// Leave downloaded files editable instead of read-only
    #[serde(default)]
    pub writable: bool,

    /// Download even when the local checksum matches
    #[serde(default)]
    pub force_overwrite: bool,

    /// Stage downloads in the temp root and move them into place afterwards
    #[serde(default)]
    pub download_to_temp: bool,

    /// Local root replacing the vault-root-relative mapping
    #[serde(default)]
    pub output_root: Option<String>,

    #[serde(default)]
    pub folder_mappings: Vec<FolderMapping>,

    /// Vault folders whose local copy must match the vault exactly
    #[serde(default)]
    pub mirror_roots: Vec<String>,

    /// Paths removed unconditionally each run (local, or vault-rooted `$/...`)
    #[serde(default)]
    pub delete_paths: Vec<String>,

    /// Extensions of downloaded files that are executed after download
    #[serde(default)]
    pub run_on_download: Vec<String>,

    /// Pull the structural children of every matched file as well
    #[serde(default)]
    pub children_of_matches: bool,

    /// Abort the run when a single-file scope does not exist
    #[serde(default)]
    pub required: bool,

    /// Free-form tag for logging and grouping
    #[serde(default)]
    pub component: Option<String>,
}

impl SyncRule {
    /// A rule covering `scope` with every option at its default.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            exclude: Vec::new(),
            extensions: Vec::new(),
            lifecycle: None,
            recursive: false,
            writable: false,
            force_overwrite: false,
            download_to_temp: false,
            output_root: None,
            folder_mappings: Vec::new(),
            mirror_roots: Vec::new(),
            delete_paths: Vec::new(),
            run_on_download: Vec::new(),
            children_of_matches: false,
            required: false,
            component: None,
        }
    }

    /// Name used in log lines and error messages.
    pub fn label(&self) -> &str {
        self.component.as_deref().unwrap_or(&self.scope)
    }

    /// Whether the rule targets whole folders rather than individual files.
    pub fn is_folder_mode(&self) -> bool {
        self.is_folder_pattern() || !self.mirror_roots.is_empty()
    }

    /// `extensions == ["/"]`
    pub fn is_folder_pattern(&self) -> bool {
        self.extensions.len() == 1 && self.extensions[0] == FOLDER_PATTERN
    }

    /// Whether a downloaded file with this name should be executed.
    pub fn runs_on_download(&self, file_name: &str) -> bool {
        self.run_on_download
            .iter()
            .any(|ext| vault_path::ends_with_ci(file_name, ext))
    }

    /// The output override root as a local path.
    pub fn output_root_path(&self) -> Option<NormalizedPath> {
        self.output_root.as_deref().map(NormalizedPath::new)
    }

    /// Bring every vault path to canonical form. Idempotent.
    pub fn normalized(mut self) -> Self {
        self.scope = vault_path::normalize(&self.scope);
        self.mirror_roots = self.mirror_roots.iter().map(|p| vault_path::normalize(p)).collect();
        self.exclude = self.exclude.iter().map(|p| p.replace('\\', "/")).collect();
        for mapping in &mut self.folder_mappings {
            mapping.remote = vault_path::normalize(&mapping.remote);
        }
        self
    }

    /// Check the rule for configuration mistakes.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Error::InvalidRule {
            rule: self.label().to_string(),
            message,
        };

        if self.scope.is_empty() {
            return Err(invalid("scope is empty".into()));
        }
        if !vault_path::is_within(&self.scope, vault_path::ROOT) {
            return Err(invalid(format!("scope '{}' is not rooted at '$'", self.scope)));
        }
        if let Some(root) = self.output_root_path()
            && !root.is_absolute()
        {
            return Err(invalid(format!("output root '{root}' is not absolute")));
        }
        for mirror in &self.mirror_roots {
            if !vault_path::is_within(mirror, &self.scope) {
                return Err(invalid(format!("mirror root '{mirror}' is outside the scope")));
            }
        }
        for mapping in &self.folder_mappings {
            if !NormalizedPath::new(&mapping.local).is_absolute() {
                return Err(invalid(format!("mapping target '{}' is not absolute", mapping.local)));
            }
        }
        if self.extensions.iter().any(|e| e.is_empty()) {
            return Err(invalid("empty extension pattern".into()));
        }
        Ok(())
    }
}
