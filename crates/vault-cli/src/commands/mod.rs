//! Command implementations for vault-cli

pub mod plan;
pub mod sync;

pub use plan::run_plan;
pub use sync::run_sync;

use std::path::{Path, PathBuf};

use tracing::debug;
use vault_core::{DirectoryRepository, SyncConfig, SyncStateFile};
use vault_fs::RobustnessConfig;

use crate::error::{CliError, Result};

/// Collaborators built from one configuration file.
pub struct Context {
    pub config: SyncConfig,
    pub repository: DirectoryRepository,
    pub state: SyncStateFile,
}

impl Context {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config = SyncConfig::load(config_path)?;
        if config.repository.path.as_os_str().is_empty() {
            return Err(CliError::user(format!(
                "{}: repository.path must name the exported vault directory",
                config_path.display()
            )));
        }

        let io = RobustnessConfig::with_retries(config.io_retries);
        let repository = DirectoryRepository::new(config.repository.path.clone()).with_robustness(io);
        let state_path = config.state_file.clone().unwrap_or_else(default_state_file);
        debug!(state = %state_path.display(), "using state file");
        let state = SyncStateFile::new(state_path).with_robustness(io);

        Ok(Self {
            config,
            repository,
            state,
        })
    }
}

/// `<data dir>/vault-sync/state.toml`, or the working directory when the
/// platform has no data directory.
fn default_state_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vault-sync")
        .join("state.toml")
}
