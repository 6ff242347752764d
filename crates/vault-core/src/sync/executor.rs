//! Applying a [`SyncPlan`] to the local filesystem

use std::process::Command;

use tracing::{debug, error, info, warn};
use vault_fs::{NormalizedPath, RobustnessConfig, io};

use super::RunResult;
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::plan::{DownloadAction, MirrorCleanupAction, SyncPlan};
use crate::progress::{ProgressSink, percent};
use crate::repository::{DownloadItem, Repository, RepositoryError};

/// Default number of files handed to the repository per download call.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Executes a downloaded file.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &NormalizedPath) -> std::io::Result<()>;
}

/// Spawns the file as a process in its own folder and waits for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &NormalizedPath) -> std::io::Result<()> {
        let mut cmd = Command::new(program.to_native());
        if let Some(dir) = program.parent() {
            cmd.current_dir(dir.to_native());
        }

        let status = cmd.status()?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!("{program} exited with {status}")))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    pub batch_size: usize,
    pub io: RobustnessConfig,
    pub network: RobustnessConfig,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            io: RobustnessConfig::default(),
            network: RobustnessConfig::with_retries(3),
        }
    }
}

/// Runs the download list in fixed-size batches, then the per-rule
/// post-download work.
///
/// A failing batch or file is recorded in the [`RunResult`] and the run
/// moves on. Only authentication failures and cancellation stop it.
pub struct BatchExecutor<'a> {
    repository: &'a dyn Repository,
    progress: &'a dyn ProgressSink,
    runner: &'a dyn CommandRunner,
    options: ExecutorOptions,
    cancel: CancellationToken,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(
        repository: &'a dyn Repository,
        progress: &'a dyn ProgressSink,
        runner: &'a dyn CommandRunner,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            repository,
            progress,
            runner,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Download phase. Cancellation is checked before every batch.
    pub fn download(&self, downloads: &[DownloadAction], result: &mut RunResult) -> Result<()> {
        let total = downloads.len();
        let mut done = 0;

        for batch in downloads.chunks(self.options.batch_size.max(1)) {
            self.cancel.check()?;

            let mut items = Vec::with_capacity(batch.len());
            for action in batch {
                match self.prepare(action) {
                    Ok(()) => items.push(DownloadItem {
                        record: action.record.clone(),
                        target: action.target().clone(),
                    }),
                    Err(e) => {
                        warn!(file = %action.destination, error = %e, "cannot prepare destination");
                        result.fail(action.master_id(), format!("{}: {}", action.destination, e));
                    }
                }
            }

            if !items.is_empty() {
                self.download_batch(&items, result)?;
            }

            done += batch.len();
            self.progress.log_with_progress(
                &format!("Downloaded {done} of {total} files"),
                percent(done, total),
            );
        }
        Ok(())
    }

    fn download_batch(&self, items: &[DownloadItem], result: &mut RunResult) -> Result<()> {
        let outcome = self
            .options
            .network
            .retry_if("download_batch", RepositoryError::is_transient, || {
                self.repository.download_batch(items)
            });

        match outcome {
            Ok(failed) => {
                for item in items {
                    let id = item.record.master_id;
                    if failed.contains(&id) {
                        result.fail(id, format!("download of {} failed", item.record.full_path()));
                    } else {
                        result.downloaded += 1;
                    }
                }
                Ok(())
            }
            Err(e) if e.is_authentication() => Err(e.into()),
            Err(e) => {
                error!(files = items.len(), error = %e, "download batch failed");
                for item in items {
                    result.fail(
                        item.record.master_id,
                        format!("download of {} failed: {}", item.record.full_path(), e),
                    );
                }
                Ok(())
            }
        }
    }

    /// Parent folder exists and an existing read-only copy is writable.
    fn prepare(&self, action: &DownloadAction) -> vault_fs::Result<()> {
        let target = action.target();
        if let Some(parent) = target.parent() {
            io::create_dir_all(&parent, self.options.io)?;
        }
        for path in [target, &action.destination] {
            if io::is_readonly(path) {
                io::set_readonly(path, false, self.options.io)?;
            }
        }
        Ok(())
    }

    /// Move staged files into place and lock down non-writable ones.
    pub fn materialize(&self, plan: &SyncPlan, result: &mut RunResult) {
        for action in &plan.downloads {
            if result.has_failed(action.master_id()) {
                continue;
            }

            if let Some(staging) = &action.staging {
                let moved = action
                    .destination
                    .parent()
                    .map_or(Ok(()), |parent| io::create_dir_all(&parent, self.options.io))
                    .and_then(|()| io::rename_replace(staging, &action.destination, self.options.io));
                if let Err(e) = moved {
                    error!(from = %staging, to = %action.destination, error = %e, "cannot move staged file");
                    result.fail(action.master_id(), format!("{}: {}", action.destination, e));
                    continue;
                }
            }

            if !action.writable
                && let Err(e) = io::set_readonly(&action.destination, true, self.options.io)
            {
                warn!(file = %action.destination, error = %e, "cannot mark read-only");
                result.error(format!("{}: {}", action.destination, e));
            }
        }
    }

    /// Post-download work, rule by rule: deletes, mirror cleanup,
    /// run-on-download commands, then folder creation.
    pub fn finish(&self, plan: &SyncPlan, result: &mut RunResult) {
        for rule_index in 0..plan.rule_count {
            for delete in plan.deletes_for(rule_index) {
                match io::remove_path(&delete.path, self.options.io) {
                    Ok(true) => {
                        info!(path = %delete.path, reason = ?delete.reason, "deleted");
                        result.deleted += 1;
                    }
                    Ok(false) => debug!(path = %delete.path, "already gone"),
                    Err(e) => result.error(format!("cannot delete {}: {}", delete.path, e)),
                }
            }

            for mirror in plan.mirrors_for(rule_index) {
                self.clean_mirror(mirror, result);
            }

            for action in plan.downloads_for(rule_index) {
                if !action.run_after || result.has_failed(action.master_id()) {
                    continue;
                }
                self.progress.log(&format!("Running {}", action.destination));
                if let Err(e) = self
                    .options
                    .io
                    .retry("run_on_download", || self.runner.run(&action.destination))
                {
                    error!(file = %action.destination, error = %e, "command failed");
                    result.error(format!("running {} failed: {}", action.destination, e));
                }
            }

            for folder in plan.folders_for(rule_index) {
                if let Err(e) = io::create_dir_all(&folder.path, self.options.io) {
                    result.error(format!("cannot create {}: {}", folder.path, e));
                }
            }
        }
    }

    /// Remove every local entry of a mirrored folder that the vault does
    /// not have.
    fn clean_mirror(&self, mirror: &MirrorCleanupAction, result: &mut RunResult) {
        let entries = match io::list_dir(&mirror.local_folder, self.options.io) {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => {
                debug!(folder = %mirror.local_folder, "mirror folder absent locally");
                return;
            }
            Err(e) => {
                warn!(folder = %mirror.local_folder, error = %e, "cannot list mirror folder, skipping");
                return;
            }
        };

        for entry in entries {
            let key = entry.name.to_lowercase();
            let keep = if entry.is_dir {
                mirror.keep_dirs.contains(&key)
            } else {
                mirror.keep_files.contains(&key)
            };
            if keep {
                continue;
            }

            let path = mirror.local_folder.join(&entry.name);
            let removed = if entry.is_dir {
                io::remove_dir_all(&path, self.options.io)
            } else {
                io::remove_file(&path, self.options.io)
            };
            match removed {
                Ok(true) => {
                    info!(path = %path, mirror = %mirror.remote_folder, "removed extra local entry");
                    result.deleted += 1;
                }
                Ok(false) => {}
                Err(e) => result.error(format!("cannot remove {path}: {e}")),
            }
        }
    }
}
