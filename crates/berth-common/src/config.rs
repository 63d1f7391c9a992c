//! Global configuration model for berth.
//!
//! Values come from an optional TOML file and are then overridden by CLI
//! flags. Every field has a default so a partial file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{BerthError, Result};
use crate::types::ListScope;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BerthConfig {
    /// Container engine connection settings.
    pub engine: EngineConfig,
    /// Whether listings include stopped containers and intermediate images.
    pub show_all: bool,
    /// Metadata file locations and output format.
    pub metadata: MetadataConfig,
}

/// Container engine connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Unix socket path, `None` for the engine's local default.
    pub socket: Option<String>,
    /// Deadline for each engine call, in seconds.
    pub timeout_secs: u64,
    /// Grace period before a stopped container is killed, in seconds.
    pub stop_grace_secs: i64,
    /// Deadline for image pulls and archive copies, in seconds.
    pub transfer_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket: None,
            timeout_secs: constants::DEFAULT_ENGINE_TIMEOUT_SECS,
            stop_grace_secs: constants::DEFAULT_STOP_GRACE_SECS,
            transfer_timeout_secs: constants::DEFAULT_TRANSFER_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    /// Deadline for ordinary engine calls.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Deadline for a stop request.
    ///
    /// The engine answers only once the container exits, up to the grace
    /// period after the request.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.saturating_add(self.stop_grace_secs.unsigned_abs()))
    }

    /// Deadline for image pulls and archive copies.
    #[must_use]
    pub const fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    /// Longest deadline any single request may need.
    #[must_use]
    pub fn longest_timeout(&self) -> Duration {
        self.call_timeout()
            .max(self.stop_timeout())
            .max(self.transfer_timeout())
    }
}

/// Serialization format for pod manifests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    /// Pretty-printed JSON, `<name>-pod.json`.
    #[default]
    Json,
    /// YAML, `<name>-pod.yaml`.
    Yaml,
}

/// Metadata file locations and output format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Directory for user-written metadata files.
    pub user_dir: PathBuf,
    /// Directory for metadata installed from images.
    pub system_dir: PathBuf,
    /// Pod manifest format.
    pub manifest_format: ManifestFormat,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            user_dir: PathBuf::from(constants::USER_TEMPLATE_DIR),
            system_dir: PathBuf::from(constants::SYSTEM_TEMPLATE_DIR),
            manifest_format: ManifestFormat::default(),
        }
    }
}

impl BerthConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or has wrong types.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BerthError::Config {
            message: e.to_string(),
        })
    }

    /// Loads configuration from `path`, or from the per-user default file.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match constants::default_config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(path = %path.display(), "loading config");
        let text = std::fs::read_to_string(&path).map_err(|e| BerthError::Io {
            path: path.clone(),
            source: e,
        })?;
        Self::from_toml(&text)
    }

    /// Returns the listing scope implied by `show_all`.
    #[must_use]
    pub const fn list_scope(&self) -> ListScope {
        ListScope::from_all(self.show_all)
    }
}
