//! Run configuration
//!
//! A configuration file (TOML, JSON or YAML, chosen by extension) names the
//! local vault root, where the repository lives, retry settings and the
//! ordered rule list:
//!
//! ```toml
//! vault_root = "C:/Vault"
//!
//! [repository]
//! path = "//server/export"
//!
//! [retry]
//! max_retries = 3
//!
//! [[rules]]
//! scope = "$/Designs"
//! extensions = [".iam", ".ipt"]
//! recursive = true
//! ```
//!
//! Relative paths are resolved against the folder holding the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vault_fs::{ConfigDocument, NormalizedPath, RobustnessConfig};

use crate::error::{Error, Result};
use crate::preflight::{self, ReachabilityProbe};
use crate::rules::SyncRule;
use crate::sync::{DEFAULT_BATCH_SIZE, RetryDriver, SessionConfig};

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_io_retries() -> u32 {
    5
}

fn default_network_retries() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    8
}

/// Where the directory-backed repository reads the vault from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySection {
    pub path: PathBuf,
}

/// Whole-run retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Replaces the escalating schedule with a constant wait
    #[serde(default)]
    pub fixed_delay_secs: Option<u64>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            fixed_delay_secs: None,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Local folder the vault root `$` maps to
    pub vault_root: PathBuf,
    #[serde(default)]
    pub repository: RepositorySection,
    /// Where the last-synchronized timestamp is kept
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    /// Staging folder for rules that download to temp
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_io_retries")]
    pub io_retries: u32,
    #[serde(default = "default_network_retries")]
    pub network_retries: u32,
    #[serde(default)]
    pub retry: RetrySection,
    /// `tcp://host:port` or paths; empty disables the pre-flight check
    #[serde(default)]
    pub probe_targets: Vec<String>,
    #[serde(default)]
    pub rules: Vec<SyncRule>,
}

impl SyncConfig {
    /// Load, resolve relative paths, normalize rules and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let document = ConfigDocument::read(path, RobustnessConfig::default())?;
        let mut config: SyncConfig = document.parse()?;
        config.resolve_paths(&document);
        config.rules = config.rules.into_iter().map(SyncRule::normalized).collect();
        config.validate(path)?;
        debug!(path = %path.display(), format = %document.format(), rules = config.rules.len(), "loaded configuration");
        Ok(config)
    }

    fn resolve_paths(&mut self, document: &ConfigDocument) {
        if !self.vault_root.as_os_str().is_empty() {
            self.vault_root = document.resolve(&self.vault_root);
        }
        if !self.repository.path.as_os_str().is_empty() {
            self.repository.path = document.resolve(&self.repository.path);
        }
        if let Some(state) = self.state_file.as_mut() {
            *state = document.resolve(state);
        }
        if let Some(temp) = self.temp_root.as_mut() {
            *temp = document.resolve(temp);
        }
    }

    /// Settings that make the whole file unusable. Individual bad rules are
    /// not checked here; planning reports and skips them.
    pub fn validate(&self, path: &Path) -> Result<()> {
        let fail = |message: &str| Error::Config {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if self.vault_root.as_os_str().is_empty() {
            return Err(fail("vault_root must be set"));
        }
        if self.batch_size == 0 {
            return Err(fail("batch_size must be at least 1"));
        }
        if self.rules.is_empty() {
            return Err(fail("no rules configured"));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut session = SessionConfig::new(self.vault_root.clone());
        if let Some(temp) = &self.temp_root {
            session.temp_root = NormalizedPath::new(temp);
        }
        session.batch_size = self.batch_size;
        session.io = RobustnessConfig::with_retries(self.io_retries);
        session.network = RobustnessConfig::with_retries(self.network_retries);
        session
    }

    pub fn retry_driver(&self) -> RetryDriver {
        let driver = RetryDriver::new(self.retry.max_retries);
        match self.retry.fixed_delay_secs {
            Some(secs) => driver.with_fixed_delay(Duration::from_secs(secs)),
            None => driver,
        }
    }

    pub fn probes(&self) -> Vec<Box<dyn ReachabilityProbe>> {
        self.probe_targets.iter().map(|t| preflight::probe_for(t)).collect()
    }
}
