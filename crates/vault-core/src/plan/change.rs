//! Checksum-based change detection

use tracing::debug;
use vault_fs::checksum::checksums_match;
use vault_fs::{NormalizedPath, RobustnessConfig, io};

use crate::error::Result;
use crate::repository::{RemoteFileRecord, Repository};
use crate::rules::SyncRule;

/// Decides whether a vault file has to be fetched again.
pub struct ChangeDetector<'a> {
    repository: &'a dyn Repository,
    io: RobustnessConfig,
    network: RobustnessConfig,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(repository: &'a dyn Repository, io: RobustnessConfig, network: RobustnessConfig) -> Self {
        Self {
            repository,
            io,
            network,
        }
    }

    /// A download is needed when the local file is missing, when the rule
    /// forces overwrites, or when the local checksum differs from the
    /// vault's.
    pub fn needs_download(&self, rule: &SyncRule, record: &RemoteFileRecord, local: &NormalizedPath) -> Result<bool> {
        if !io::exists(local, self.io)? {
            debug!(file = %record.full_path(), "missing locally");
            return Ok(true);
        }
        if rule.force_overwrite {
            return Ok(true);
        }

        let local_checksum = self.network.retry_if(
            "local_checksum",
            |e: &crate::repository::RepositoryError| e.is_transient(),
            || self.repository.local_checksum(local),
        )?;
        let changed = !checksums_match(&local_checksum, &record.checksum);
        if changed {
            debug!(file = %record.full_path(), local = %local_checksum, remote = %record.checksum, "checksum differs");
        }
        Ok(changed)
    }
}
