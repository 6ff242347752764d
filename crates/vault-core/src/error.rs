//! Error types for vault-core

use std::path::PathBuf;

use crate::repository::RepositoryError;

/// Result type for vault-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Whether a failed run may be attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient fault: network, service, share contention.
    Retryable,
    /// Retrying cannot help: bad credentials, bad configuration, a required
    /// file that does not exist, or an explicit cancellation.
    Fatal,
}

/// Types whose failures can be classified for the retry driver.
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

/// Errors that can occur in vault-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The repository rejected or failed a call
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A rule failed validation
    #[error("Invalid rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    /// The rule's scope does not exist in the vault
    #[error("Path not found in vault: {path}")]
    ScopeNotFound { path: String },

    /// A single-file rule marked as required could not find its file
    #[error("Required file not found in vault: {path}")]
    RequiredFileMissing { path: String },

    /// None of the configured servers answered the pre-flight probe
    #[error("No reachable server among {targets:?}")]
    Unreachable { targets: Vec<String> },

    /// The session was cancelled by its host
    #[error("Synchronization interrupted")]
    Interrupted,

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Filesystem error from vault-fs
    #[error(transparent)]
    Fs(#[from] vault_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Errors that end the whole session rather than the current rule.
    pub fn is_session_level(&self) -> bool {
        match self {
            Self::Repository(e) => e.is_authentication(),
            Self::RequiredFileMissing { .. } | Self::Interrupted | Self::Unreachable { .. } => true,
            _ => false,
        }
    }
}

impl Classify for Error {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Repository(e) => e.class(),
            Self::InvalidRule { .. }
            | Self::ScopeNotFound { .. }
            | Self::RequiredFileMissing { .. }
            | Self::Interrupted
            | Self::Config { .. }
            | Self::TomlDe(_)
            | Self::TomlSer(_) => ErrorClass::Fatal,
            Self::Fs(vault_fs::Error::ConfigParse { .. } | vault_fs::Error::UnsupportedFormat { .. }) => {
                ErrorClass::Fatal
            }
            Self::Unreachable { .. } | Self::Fs(_) | Self::Io(_) => {
                ErrorClass::Retryable
            }
        }
    }
}
