//! Rule scope evaluation for vault paths

use super::rule::SyncRule;
use crate::vault_path;

/// Decides whether vault paths belong to a rule.
///
/// Patterns are lower-cased once on construction; every comparison is
/// case-insensitive.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    scope: String,
    recursive: bool,
    folder_pattern: bool,
    extensions: Vec<String>,
    exclude: Vec<String>,
}

impl PathMatcher {
    pub fn new(rule: &SyncRule) -> Self {
        Self {
            scope: rule.scope.to_lowercase(),
            recursive: rule.recursive,
            folder_pattern: rule.is_folder_pattern(),
            extensions: rule.extensions.iter().map(|e| e.to_lowercase()).collect(),
            exclude: rule
                .exclude
                .iter()
                .filter(|e| !e.is_empty())
                .map(|e| e.to_lowercase())
                .collect(),
        }
    }

    /// Whether the file `folder_path/file_name` is selected by the rule.
    ///
    /// `allow_children` is set for files reached through a structural
    /// "children of" expansion; those may live outside the rule's scope.
    pub fn matches(&self, folder_path: &str, file_name: &str, allow_children: bool) -> bool {
        let folder = folder_path.to_lowercase();
        let full = vault_path::join(&folder, &file_name.to_lowercase());

        if !allow_children && !self.recursive && full != self.scope && folder != self.scope {
            return false;
        }
        if !allow_children && !full.contains(&self.scope) {
            return false;
        }
        if !self.extension_accepts(&full) {
            return false;
        }
        !self.is_excluded(&full)
    }

    /// Whether a sub-folder is selected by the rule. Only scope, recursion
    /// and exclusion apply; extension patterns are about files.
    pub fn matches_folder(&self, folder_path: &str) -> bool {
        let folder = folder_path.to_lowercase();
        if !vault_path::is_within(&folder, &self.scope) {
            return false;
        }
        if !self.recursive {
            let parent = vault_path::parent(&folder).unwrap_or("");
            if folder != self.scope && parent != self.scope {
                return false;
            }
        }
        !self.is_excluded(&folder)
    }

    fn extension_accepts(&self, full_lower: &str) -> bool {
        self.extensions.is_empty()
            || self.folder_pattern
            || self.extensions.iter().any(|ext| full_lower.ends_with(ext.as_str()))
    }

    fn is_excluded(&self, full_lower: &str) -> bool {
        self.exclude.iter().any(|pattern| full_lower.contains(pattern.as_str()))
    }
}
