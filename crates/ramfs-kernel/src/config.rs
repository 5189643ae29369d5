//! Engine configuration.
//!
//! Loaded from RON. Every field has a default, so an empty `()` document is a
//! valid config for a purely in-memory store:
//!
//! ```ron
//! (
//!     backing_dir: Some("~/.local/share/ramfs"),
//!     sync_on_flush: true,
//!     root_mode: 0o755,
//!     max_name_len: 255,
//! )
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vfs::BackingStore;

/// Errors raised while loading config or binding the backing directory.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The backing directory is missing or not a directory.
    #[error("backing directory {0} does not exist or is not a directory")]
    BackingDir(PathBuf),
}

/// Startup configuration for [`crate::RamFs`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RamfsConfig {
    /// Directory that `flush` mirrors files into. `None` makes flush a no-op.
    pub backing_dir: Option<PathBuf>,
    /// `fsync` temp files (and their directory) during flush.
    pub sync_on_flush: bool,
    /// Permission bits of `/`.
    pub root_mode: u32,
    /// Longest allowed path component, in bytes.
    pub max_name_len: usize,
}

impl Default for RamfsConfig {
    fn default() -> Self {
        Self {
            backing_dir: None,
            sync_on_flush: true,
            root_mode: 0o755,
            max_name_len: 255,
        }
    }
}

impl RamfsConfig {
    /// Parse a RON document.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Read and parse a RON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron(&text)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Set the backing directory.
    pub fn with_backing_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backing_dir = Some(dir.into());
        self
    }

    /// Set whether flush syncs to stable storage.
    pub fn with_sync_on_flush(mut self, sync: bool) -> Self {
        self.sync_on_flush = sync;
        self
    }

    /// Backing directory with a leading `~` expanded.
    pub fn expanded_backing_dir(&self) -> Option<PathBuf> {
        self.backing_dir.as_ref().map(|dir| match dir.to_str() {
            Some(s) => PathBuf::from(shellexpand::tilde(s).into_owned()),
            None => dir.clone(),
        })
    }

    /// Bind the configured backing directory, if any.
    pub fn backing_store(&self) -> Result<Option<BackingStore>, ConfigError> {
        self.expanded_backing_dir()
            .map(|dir| BackingStore::bind(dir, self.sync_on_flush))
            .transpose()
    }
}
