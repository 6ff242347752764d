//! Retrying filesystem operations
//!
//! Every local mutation in a sync run goes through these helpers. Failures
//! are retried immediately (no delay) up to [`RobustnessConfig::retries`]
//! times, which absorbs share violations and transient locks on network
//! drives. A missing path is never retried.

use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::time::Duration;

use backoff::backoff::Backoff;
use fs2::FileExt;
use tracing::{debug, warn};

use crate::{Error, NormalizedPath, Result};

/// Retry settings for local filesystem operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobustnessConfig {
    /// How many times a failed operation is repeated before the error
    /// propagates. Zero means a single attempt.
    pub retries: u32,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self { retries: 5 }
    }
}

/// Backoff policy yielding `limit` zero-length waits, then giving up.
#[derive(Debug, Clone)]
struct ImmediateRetries {
    limit: u32,
    remaining: u32,
}

impl ImmediateRetries {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }
}

impl Backoff for ImmediateRetries {
    fn reset(&mut self) {
        self.remaining = self.limit;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(Duration::ZERO)
    }
}

impl RobustnessConfig {
    /// Create a config with the given retry count.
    pub fn with_retries(retries: u32) -> Self {
        Self { retries }
    }

    /// Run `op`, retrying every failure.
    pub fn retry<T, E, F>(&self, what: &str, op: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> std::result::Result<T, E>,
        E: Display,
    {
        self.retry_if(what, |_| true, op)
    }

    /// Run `op`, retrying failures for which `retryable` returns true.
    /// Other failures propagate on first occurrence.
    pub fn retry_if<T, E, F, P>(&self, what: &str, retryable: P, mut op: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> std::result::Result<T, E>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let outcome = backoff::retry_notify(
            ImmediateRetries::new(self.retries),
            || {
                op().map_err(|err| {
                    if retryable(&err) {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            },
            |err: E, _: Duration| warn!(operation = what, error = %err, "retrying"),
        );

        outcome.map_err(|err| match err {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }

    fn io<T, F>(&self, what: &str, path: &NormalizedPath, op: F) -> Result<T>
    where
        F: FnMut() -> std::io::Result<T>,
    {
        self.retry_if(what, |e: &std::io::Error| e.kind() != ErrorKind::NotFound, op)
            .map_err(|e| Error::io(path.to_native(), e))
    }
}

/// A single entry of a local directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename so readers never observe a partial file,
/// and holds an advisory lock on the temp file while writing. The temp file
/// is removed again when any step fails.
pub fn write_atomic(path: &NormalizedPath, content: &[u8], robustness: RobustnessConfig) -> Result<()> {
    let native_path = path.to_native();

    if let Some(parent) = path.parent() {
        create_dir_all(&parent, robustness)?;
    }

    // same directory keeps the rename on one filesystem
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default(),
        std::process::id()
    );
    let temp_path = native_path.with_file_name(&temp_name);

    let outcome = write_locked(&temp_path, &native_path, content).and_then(|()| {
        robustness
            .retry("rename", || fs::rename(&temp_path, &native_path))
            .map_err(|e| Error::io(&native_path, e))
    });
    if outcome.is_err()
        && let Err(e) = fs::remove_file(&temp_path)
        && e.kind() != ErrorKind::NotFound
    {
        warn!(path = %temp_path.display(), error = %e, "cannot remove temp file");
    }
    outcome
}

fn write_locked(temp_path: &Path, target: &Path, content: &[u8]) -> Result<()> {
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)
        .map_err(|e| Error::io(temp_path, e))?;

    temp_file
        .lock_exclusive()
        .map_err(|_| Error::LockFailed { path: target.to_path_buf() })?;
    temp_file.write_all(content).map_err(|e| Error::io(temp_path, e))?;
    temp_file.sync_all().map_err(|e| Error::io(temp_path, e))?;
    temp_file
        .unlock()
        .map_err(|_| Error::LockFailed { path: target.to_path_buf() })
}

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath, robustness: RobustnessConfig) -> Result<String> {
    let native = path.to_native();
    robustness.io("read", path, || fs::read_to_string(&native))
}

/// Check existence, retrying transient metadata failures.
pub fn exists(path: &NormalizedPath, robustness: RobustnessConfig) -> Result<bool> {
    let native = path.to_native();
    robustness.io("exists", path, || native.try_exists())
}

/// Create a directory and all of its parents.
pub fn create_dir_all(path: &NormalizedPath, robustness: RobustnessConfig) -> Result<()> {
    let native = path.to_native();
    robustness.io("create_dir_all", path, || fs::create_dir_all(&native))
}

/// Delete a file. Returns `false` when there was nothing to delete.
///
/// Read-only files are made writable first.
pub fn remove_file(path: &NormalizedPath, robustness: RobustnessConfig) -> Result<bool> {
    let native = path.to_native();
    let outcome = robustness.io("remove_file", path, || {
        clear_readonly(&native)?;
        fs::remove_file(&native)
    });
    match outcome {
        Ok(()) => {
            debug!(path = %path, "removed file");
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete a directory tree. Returns `false` when there was nothing to delete.
pub fn remove_dir_all(path: &NormalizedPath, robustness: RobustnessConfig) -> Result<bool> {
    let native = path.to_native();
    let outcome = robustness.io("remove_dir_all", path, || {
        clear_readonly_tree(&native)?;
        fs::remove_dir_all(&native)
    });
    match outcome {
        Ok(()) => {
            debug!(path = %path, "removed directory");
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete whatever is at `path`, file or directory. A symbolic link is
/// removed itself and its target is left untouched.
pub fn remove_path(path: &NormalizedPath, robustness: RobustnessConfig) -> Result<bool> {
    let native = path.to_native();
    let file_type = match robustness.io("stat", path, || fs::symlink_metadata(&native)) {
        Ok(meta) => meta.file_type(),
        Err(e) if e.is_not_found() => return Ok(false),
        Err(e) => return Err(e),
    };

    if file_type.is_symlink() {
        remove_link(path, robustness)
    } else if file_type.is_dir() {
        remove_dir_all(path, robustness)
    } else {
        remove_file(path, robustness)
    }
}

fn remove_link(path: &NormalizedPath, robustness: RobustnessConfig) -> Result<bool> {
    let native = path.to_native();
    let outcome = robustness.io("remove_link", path, || {
        // directory links on Windows are removed like directories
        if cfg!(windows) && native.is_dir() {
            fs::remove_dir(&native)
        } else {
            fs::remove_file(&native)
        }
    });
    match outcome {
        Ok(()) => {
            debug!(path = %path, "removed link");
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Move `from` onto `to`, replacing any existing file and creating parent
/// directories as needed.
pub fn rename_replace(from: &NormalizedPath, to: &NormalizedPath, robustness: RobustnessConfig) -> Result<()> {
    if let Some(parent) = to.parent() {
        create_dir_all(&parent, robustness)?;
    }
    let (src, dst) = (from.to_native(), to.to_native());
    robustness.io("rename", to, || {
        if dst.is_file() {
            clear_readonly(&dst)?;
            fs::remove_file(&dst)?;
        }
        fs::rename(&src, &dst)
    })
}

/// List the immediate children of a directory, sorted by name.
pub fn list_dir(path: &NormalizedPath, robustness: RobustnessConfig) -> Result<Vec<LocalEntry>> {
    let native = path.to_native();
    let mut entries = robustness.io("list_dir", path, || {
        let mut out = Vec::new();
        for entry in fs::read_dir(&native)? {
            let entry = entry?;
            out.push(LocalEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        Ok(out)
    })?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Set or clear the read-only attribute of a file.
pub fn set_readonly(path: &NormalizedPath, readonly: bool, robustness: RobustnessConfig) -> Result<()> {
    let native = path.to_native();
    robustness.io("set_readonly", path, || {
        let mut perms = fs::metadata(&native)?.permissions();
        if perms.readonly() != readonly {
            perms.set_readonly(readonly);
            fs::set_permissions(&native, perms)?;
        }
        Ok(())
    })
}

/// Whether the file at `path` is read-only. Missing files are not.
pub fn is_readonly(path: &NormalizedPath) -> bool {
    fs::metadata(path.to_native())
        .map(|m| m.permissions().readonly())
        .unwrap_or(false)
}

#[allow(clippy::permissions_set_readonly_false)]
fn clear_readonly(path: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    let mut perms = meta.permissions();
    if perms.readonly() {
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

fn clear_readonly_tree(path: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let child = entry.path();
        if entry.file_type()?.is_dir() {
            clear_readonly_tree(&child)?;
        } else {
            clear_readonly(&child)?;
        }
    }
    Ok(())
}
