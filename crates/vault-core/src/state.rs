//! Persistent "last synchronized" state
//!
//! The timestamp is read before planning and written only after a run that
//! finished with zero errors.

use std::fs::File;
use std::io::Read;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vault_fs::{NormalizedPath, RobustnessConfig, io};

use crate::error::Result;

/// Access to the persisted run state.
pub trait StateStore: Send + Sync {
    fn last_synchronized(&self) -> Result<Option<DateTime<Utc>>>;

    fn set_last_synchronized(&self, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateDocument {
    version: String,
    last_synchronized: Option<DateTime<Utc>>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            last_synchronized: None,
        }
    }
}

/// [`StateStore`] backed by a small TOML file.
///
/// Reads take a shared lock on the file; writes go through
/// [`io::write_atomic`], which holds an exclusive lock while it replaces
/// the file.
#[derive(Debug, Clone)]
pub struct SyncStateFile {
    path: NormalizedPath,
    robustness: RobustnessConfig,
}

impl SyncStateFile {
    pub fn new(path: impl Into<NormalizedPath>) -> Self {
        Self {
            path: path.into(),
            robustness: RobustnessConfig::default(),
        }
    }

    pub fn with_robustness(mut self, robustness: RobustnessConfig) -> Self {
        self.robustness = robustness;
        self
    }

    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }

    fn load(&self) -> Result<StateDocument> {
        if !io::exists(&self.path, self.robustness)? {
            debug!(path = %self.path, "no state file yet");
            return Ok(StateDocument::default());
        }

        let file = File::open(self.path.to_native())?;
        file.lock_shared()?;
        let mut content = String::new();
        (&file).read_to_string(&mut content)?;
        Ok(toml::from_str(&content)?)
    }
}

impl StateStore for SyncStateFile {
    fn last_synchronized(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.load()?.last_synchronized)
    }

    fn set_last_synchronized(&self, at: DateTime<Utc>) -> Result<()> {
        let mut document = self.load().unwrap_or_default();
        document.last_synchronized = Some(at);

        if let Some(parent) = self.path.parent() {
            io::create_dir_all(&parent, self.robustness)?;
        }
        let content = toml::to_string_pretty(&document)?;
        io::write_atomic(&self.path, content.as_bytes(), self.robustness)?;
        debug!(path = %self.path, at = %at, "recorded last synchronization");
        Ok(())
    }
}
