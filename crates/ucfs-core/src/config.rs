//! TOML configuration.
//!
//! ```toml
//! default_root = "/ucfs"
//! registry = "~/.config/ucfs/registry"
//! normalize = "nfc"
//!
//! [[backing]]
//! root = "/mnt/sacred"
//! kind = "local"
//! path = "/srv/sacred"
//!
//! [[backing]]
//! root = "/scratch"
//! kind = "memory"
//! ```
//!
//! Every field is optional. A missing file means defaults.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::canonical::DEFAULT_BASE;
use crate::normalize::NormalizeMode;
use crate::overlay::Overlay;
use crate::registry::{Registry, RegistryError};
use crate::vfs::{DriverTable, LocalBackend, MemoryBackend};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("backing {root}: kind \"local\" needs a path")]
    MissingBackingPath { root: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Kind of driver serving a `[[backing]]` root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackingKind {
    #[default]
    Local,
    Memory,
}

/// One `[[backing]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackingConfig {
    /// Backing root this driver serves.
    pub root: String,
    #[serde(default)]
    pub kind: BackingKind,
    /// Host directory a local driver is anchored at. `~` is expanded.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UcfsConfig {
    pub default_root: String,
    /// Registry file. Falls back to [`UcfsConfig::default_registry_path`].
    pub registry: Option<String>,
    pub normalize: NormalizeMode,
    #[serde(rename = "backing")]
    pub backings: Vec<BackingConfig>,
}

impl Default for UcfsConfig {
    fn default() -> Self {
        Self {
            default_root: DEFAULT_BASE.to_string(),
            registry: None,
            normalize: NormalizeMode::default(),
            backings: Vec::new(),
        }
    }
}

impl UcfsConfig {
    /// `<config dir>/ucfs/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ucfs").join("config.toml"))
    }

    /// `<config dir>/ucfs/registry`, if the platform has a config dir.
    pub fn default_registry_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ucfs").join("registry"))
    }

    /// Load from `path`. A file that does not exist yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Registry file to use, with `~` expanded.
    pub fn registry_path(&self) -> Option<PathBuf> {
        match &self.registry {
            Some(raw) => Some(expand(raw)),
            None => Self::default_registry_path(),
        }
    }

    /// Open the registry, loading its file when one is configured.
    pub fn open_registry(&self) -> Result<Registry, ConfigError> {
        Ok(match self.registry_path() {
            Some(path) => Registry::open(self.default_root.as_str(), path)?,
            None => Registry::new(self.default_root.as_str()),
        })
    }

    /// Build the driver table from the `[[backing]]` list.
    ///
    /// With no backings, a local driver anchored at `/` serves everything.
    pub fn build_drivers(&self) -> Result<DriverTable, ConfigError> {
        let table = DriverTable::new();
        for backing in &self.backings {
            match backing.kind {
                BackingKind::Local => {
                    let path = backing.path.as_deref().ok_or_else(|| {
                        ConfigError::MissingBackingPath {
                            root: backing.root.clone(),
                        }
                    })?;
                    table.mount(&backing.root, LocalBackend::new(expand(path)));
                }
                BackingKind::Memory => table.mount(&backing.root, MemoryBackend::new()),
            }
        }
        if self.backings.is_empty() {
            table.set_fallback(Arc::new(LocalBackend::new("/")));
        }
        Ok(table)
    }

    /// Registry, drivers and normalizer assembled into an overlay.
    pub fn build_overlay(&self) -> Result<Overlay, ConfigError> {
        let registry = Arc::new(self.open_registry()?);
        let drivers = Arc::new(self.build_drivers()?);
        Ok(Overlay::new(registry, drivers).with_normalizer(self.normalize.normalizer()))
    }
}

fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}
