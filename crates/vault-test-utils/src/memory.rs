//! [`MemoryRepository`]: a vault held in memory.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::sync::Mutex;

use chrono::Utc;
use vault_fs::NormalizedPath;
use vault_fs::checksum::compute_content_checksum;
use vault_core::repository::{
    DownloadItem, FolderId, LastRelevantVersion, MasterId, RemoteFileRecord, RemoteFolder, RepoResult, Repository,
    RepositoryError,
};
use vault_core::vault_path;

#[derive(Debug, Clone)]
struct Version {
    content: Vec<u8>,
    checksum: String,
    state: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredFile {
    id: MasterId,
    folder: String,
    name: String,
    /// Oldest first
    versions: Vec<Version>,
}

impl StoredFile {
    fn record_for(&self, version: &Version) -> RemoteFileRecord {
        RemoteFileRecord {
            master_id: self.id,
            folder_path: self.folder.clone(),
            name: self.name.clone(),
            checksum: version.checksum.clone(),
            lifecycle_state: version.state.clone(),
            last_modified: Utc::now(),
        }
    }

    fn latest(&self) -> RemoteFileRecord {
        self.record_for(self.versions.last().expect("file without versions"))
    }
}

#[derive(Debug, Default)]
struct Inner {
    /// Lower-cased path -> display path
    folders: BTreeMap<String, String>,
    /// Lower-cased full path -> file
    files: BTreeMap<String, StoredFile>,
    children: HashMap<MasterId, Vec<MasterId>>,
    next_id: i64,
    failing_downloads: HashSet<MasterId>,
    fail_batches: bool,
    fail_authentication: bool,
    transient_lookups: u32,
    lookups: usize,
    download_calls: usize,
    downloaded: Vec<MasterId>,
}

impl Inner {
    fn check(&mut self) -> RepoResult<()> {
        if self.fail_authentication {
            return Err(RepositoryError::Authentication {
                message: "invalid credentials".to_string(),
            });
        }
        Ok(())
    }

    fn by_id(&self, id: MasterId) -> Option<&StoredFile> {
        self.files.values().find(|f| f.id == id)
    }

    fn add_folder(&mut self, path: &str) {
        let mut current = Some(path.to_string());
        while let Some(folder) = current {
            current = vault_path::parent(&folder).map(str::to_string);
            self.folders.entry(vault_path::key(&folder)).or_insert(folder);
        }
    }
}

/// In-memory [`Repository`] with per-file version history, lifecycle
/// states, structural children and fault injection.
///
/// Listings are returned in case-insensitive path order. Downloads write the
/// stored bytes to the requested target.
///
/// # Example
///
/// ```rust,no_run
/// use vault_test_utils::MemoryRepository;
///
/// let repo = MemoryRepository::new();
/// let id = repo.add_file("$/Designs/a.iam", b"assembly");
/// repo.fail_download(id);
/// ```
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

impl MemoryRepository {
    /// Create a vault holding only the root folder `$`.
    pub fn new() -> Self {
        let repo = Self::default();
        repo.add_folder(vault_path::ROOT);
        repo
    }

    pub fn add_folder(&self, path: &str) {
        self.inner.lock().unwrap().add_folder(&vault_path::normalize(path));
    }

    /// Add a file (and its folders) and return its master id.
    pub fn add_file(&self, path: &str, content: &[u8]) -> MasterId {
        let path = vault_path::normalize(path);
        let (folder, name) = vault_path::split(&path);
        let mut inner = self.inner.lock().unwrap();
        inner.add_folder(folder);
        inner.next_id += 1;
        let id = MasterId(inner.next_id);
        inner.files.insert(
            vault_path::key(&path),
            StoredFile {
                id,
                folder: folder.to_string(),
                name: name.to_string(),
                versions: vec![Version {
                    content: content.to_vec(),
                    checksum: compute_content_checksum(content),
                    state: None,
                }],
            },
        );
        id
    }

    /// Check in a new version of an existing file.
    pub fn update_file(&self, path: &str, content: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        let file = inner
            .files
            .get_mut(&vault_path::key(&vault_path::normalize(path)))
            .expect("update_file: unknown file");
        file.versions.push(Version {
            content: content.to_vec(),
            checksum: compute_content_checksum(content),
            state: None,
        });
    }

    /// Set the lifecycle state of the latest version.
    pub fn set_state(&self, path: &str, state: &str) {
        let mut inner = self.inner.lock().unwrap();
        let file = inner
            .files
            .get_mut(&vault_path::key(&vault_path::normalize(path)))
            .expect("set_state: unknown file");
        if let Some(latest) = file.versions.last_mut() {
            latest.state = Some(state.to_string());
        }
    }

    pub fn remove_file(&self, path: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.files.remove(&vault_path::key(&vault_path::normalize(path)));
    }

    /// Declare `child` a structural child of `parent`.
    pub fn add_child(&self, parent: MasterId, child: MasterId) {
        self.inner.lock().unwrap().children.entry(parent).or_default().push(child);
    }

    pub fn id_of(&self, path: &str) -> MasterId {
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .get(&vault_path::key(&vault_path::normalize(path)))
            .map(|f| f.id)
            .expect("id_of: unknown file")
    }

    /// Latest record of a file, as listings report it.
    pub fn record(&self, path: &str) -> RemoteFileRecord {
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .get(&vault_path::key(&vault_path::normalize(path)))
            .map(StoredFile::latest)
            .expect("record: unknown file")
    }

    /// Make every download of `id` fail.
    pub fn fail_download(&self, id: MasterId) {
        self.inner.lock().unwrap().failing_downloads.insert(id);
    }

    /// Make every `download_batch` call fail as a whole.
    pub fn fail_batches(&self, fail: bool) {
        self.inner.lock().unwrap().fail_batches = fail;
    }

    /// Make every call fail with an authentication error.
    pub fn fail_authentication(&self, fail: bool) {
        self.inner.lock().unwrap().fail_authentication = fail;
    }

    /// Make the next `count` folder lookups fail transiently.
    pub fn fail_lookups(&self, count: u32) {
        self.inner.lock().unwrap().transient_lookups = count;
    }

    /// Number of `find_folder` calls so far.
    pub fn lookups(&self) -> usize {
        self.inner.lock().unwrap().lookups
    }

    pub fn download_calls(&self) -> usize {
        self.inner.lock().unwrap().download_calls
    }

    /// Ids successfully downloaded so far, in order.
    pub fn downloaded(&self) -> Vec<MasterId> {
        self.inner.lock().unwrap().downloaded.clone()
    }
}

impl Repository for MemoryRepository {
    fn find_folder(&self, path: &str) -> RepoResult<Option<RemoteFolder>> {
        let mut inner = self.inner.lock().unwrap();
        inner.check()?;
        inner.lookups += 1;
        if inner.transient_lookups > 0 {
            inner.transient_lookups -= 1;
            return Err(RepositoryError::Transient {
                message: "connection reset".to_string(),
            });
        }
        Ok(inner.folders.get(&vault_path::key(path)).map(|display| RemoteFolder {
            id: FolderId(display.len() as i64),
            path: display.clone(),
        }))
    }

    fn find_file(&self, folder: &RemoteFolder, name: &str) -> RepoResult<Option<RemoteFileRecord>> {
        let mut inner = self.inner.lock().unwrap();
        inner.check()?;
        let key = vault_path::key(&vault_path::join(&folder.path, name));
        Ok(inner.files.get(&key).map(StoredFile::latest))
    }

    fn list_files(&self, folder: &RemoteFolder, recursive: bool) -> RepoResult<Vec<RemoteFileRecord>> {
        let mut inner = self.inner.lock().unwrap();
        inner.check()?;
        Ok(inner
            .files
            .values()
            .filter(|f| {
                if recursive {
                    vault_path::is_within(&f.folder, &folder.path)
                } else {
                    vault_path::eq_ci(&f.folder, &folder.path)
                }
            })
            .map(StoredFile::latest)
            .collect())
    }

    fn list_folders(&self, folder: &RemoteFolder, recursive: bool) -> RepoResult<Vec<RemoteFolder>> {
        let mut inner = self.inner.lock().unwrap();
        inner.check()?;
        Ok(inner
            .folders
            .values()
            .filter(|path| match vault_path::strip_folder(path, &folder.path) {
                Some("") | None => false,
                Some(rest) => recursive || !rest.contains('/'),
            })
            .map(|path| RemoteFolder {
                id: FolderId(path.len() as i64),
                path: path.clone(),
            })
            .collect())
    }

    fn children(&self, master_id: MasterId) -> RepoResult<Vec<RemoteFileRecord>> {
        let mut inner = self.inner.lock().unwrap();
        inner.check()?;
        let ids = inner.children.get(&master_id).cloned().unwrap_or_default();
        Ok(ids
            .into_iter()
            .filter_map(|id| inner.by_id(id).map(StoredFile::latest))
            .collect())
    }

    fn last_relevant_version(
        &self,
        master_id: MasterId,
        allowed_states: &[String],
        obsolete_states: &[String],
    ) -> RepoResult<LastRelevantVersion> {
        let mut inner = self.inner.lock().unwrap();
        inner.check()?;
        let Some(file) = inner.by_id(master_id) else {
            return Ok(LastRelevantVersion::None);
        };
        let is_in = |states: &[String], state: &Option<String>| {
            state
                .as_deref()
                .is_some_and(|s| states.iter().any(|candidate| candidate.eq_ignore_ascii_case(s)))
        };
        for version in file.versions.iter().rev() {
            if is_in(obsolete_states, &version.state) {
                return Ok(LastRelevantVersion::Obsolete);
            }
            if allowed_states.is_empty() || is_in(allowed_states, &version.state) {
                return Ok(LastRelevantVersion::Version(file.record_for(version)));
            }
        }
        Ok(LastRelevantVersion::None)
    }

    fn download_batch(&self, items: &[DownloadItem]) -> RepoResult<Vec<MasterId>> {
        let mut inner = self.inner.lock().unwrap();
        inner.check()?;
        inner.download_calls += 1;
        if inner.fail_batches {
            return Err(RepositoryError::Transient {
                message: "service unavailable".to_string(),
            });
        }

        let mut failed = Vec::new();
        for item in items {
            let id = item.record.master_id;
            let content = inner.by_id(id).and_then(|file| {
                file.versions
                    .iter()
                    .find(|v| v.checksum == item.record.checksum)
                    .map(|v| v.content.clone())
            });
            let written = match content {
                Some(bytes) if !inner.failing_downloads.contains(&id) => write(&item.target, &bytes),
                _ => false,
            };
            if written {
                inner.downloaded.push(id);
            } else {
                failed.push(id);
            }
        }
        Ok(failed)
    }

    fn local_checksum(&self, path: &NormalizedPath) -> RepoResult<String> {
        let bytes = fs::read(path.to_native()).map_err(|e| vault_fs::Error::io(path.to_native(), e))?;
        Ok(compute_content_checksum(&bytes))
    }
}

fn write(target: &NormalizedPath, bytes: &[u8]) -> bool {
    let native = target.to_native();
    if let Some(parent) = native.parent()
        && fs::create_dir_all(parent).is_err()
    {
        return false;
    }
    fs::write(native, bytes).is_ok()
}
