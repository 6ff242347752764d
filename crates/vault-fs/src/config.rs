//! Reading configuration documents
//!
//! The format follows the file extension: `.toml`, `.json`, `.yaml` or
//! `.yml`. Relative paths inside a document are resolved against the folder
//! that holds it, so a configuration can travel with the files it names.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{Error, NormalizedPath, Result, io};

/// Serialization format of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from the extension of `path`, ignoring case.
    pub fn detect(path: &NormalizedPath) -> Result<Self> {
        let extension = path.extension().unwrap_or("");
        match extension.to_ascii_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(Error::UnsupportedFormat {
                extension: extension.to_string(),
            }),
        }
    }

    fn parse<T: DeserializeOwned>(self, text: &str) -> std::result::Result<T, String> {
        match self {
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
            Self::Yaml => "YAML",
        })
    }
}

/// A configuration file read from disk, ready to be deserialized.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: PathBuf,
    format: ConfigFormat,
    text: String,
}

impl ConfigDocument {
    /// Read the document at `path`. The format is checked before the file
    /// is touched.
    pub fn read(path: &Path, robustness: io::RobustnessConfig) -> Result<Self> {
        let normalized = NormalizedPath::new(path);
        let format = ConfigFormat::detect(&normalized)?;
        let text = io::read_text(&normalized, robustness)?;
        debug!(path = %normalized, %format, bytes = text.len(), "read configuration");
        Ok(Self {
            path: path.to_path_buf(),
            format,
            text,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }

    /// Folder the document lives in.
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// `path` itself when absolute, otherwise joined onto [`base_dir`](Self::base_dir).
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            self.base_dir().join(path)
        } else {
            path.to_path_buf()
        }
    }

    /// Deserialize the whole document.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        self.format.parse(&self.text).map_err(|message| Error::ConfigParse {
            path: self.path.clone(),
            format: self.format.to_string(),
            message,
        })
    }
}
