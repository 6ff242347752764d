//! [`LocalTree`]: a temporary local root for sync tests.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use vault_fs::NormalizedPath;

/// A temporary directory standing in for the local vault root.
///
/// Relative paths passed to the helpers use `/` and are resolved against
/// the root.
pub struct LocalTree {
    temp_dir: TempDir,
}

impl Default for LocalTree {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTree {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> NormalizedPath {
        NormalizedPath::new(self.temp_dir.path())
    }

    /// Native path of `relative`.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative).to_native()
    }

    pub fn write(&self, relative: &str, content: &[u8]) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn mkdir(&self, relative: &str) {
        fs::create_dir_all(self.path(relative)).unwrap();
    }

    pub fn read(&self, relative: &str) -> Vec<u8> {
        fs::read(self.path(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    pub fn is_readonly(&self, relative: &str) -> bool {
        fs::metadata(self.path(relative)).unwrap().permissions().readonly()
    }

    /// Sorted names directly inside `relative`.
    pub fn list(&self, relative: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path(relative))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    /// Make every file under the root writable again so the temp dir can
    /// be removed on all platforms.
    pub fn unlock_all(&self) {
        unlock(self.temp_dir.path());
    }
}

fn unlock(dir: &std::path::Path) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            unlock(&path);
        } else if let Ok(meta) = fs::metadata(&path) {
            let mut perms = meta.permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            let _ = fs::set_permissions(&path, perms);
        }
    }
}
