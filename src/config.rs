//! Storage locations and persisted audio settings
//!
//! Every component that touches disk receives its location through
//! [`StoragePaths`] - nothing below this module consults OS special
//! folders. The one `dirs` lookup lives here, at the edge, as a
//! convenience for the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::host::types::{HostError, HostResult};
use crate::persist::write_atomic;

/// Where the durable documents live.
#[derive(Clone, Debug)]
pub struct StoragePaths {
    /// Audio device settings document
    pub settings_file: PathBuf,
    /// Chain document
    pub chain_file: PathBuf,
}

impl StoragePaths {
    /// Both documents side by side in one directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            settings_file: dir.join("settings.json"),
            chain_file: dir.join("chain.json"),
        }
    }

    /// The platform's per-user config directory, when it has one.
    pub fn default_locations(app_name: &str) -> Option<Self> {
        dirs::config_dir().map(|base| Self::in_dir(base.join(app_name)))
    }
}

/// Persisted audio device configuration. `None` fields mean "use the
/// system default".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Primary input device name
    pub input_device: Option<String>,
    /// Primary output device name
    pub output_device: Option<String>,
    /// Monitor output device name
    pub monitor_device: Option<String>,
    /// Preferred sample rate
    pub sample_rate: Option<u32>,
    /// Preferred block size in frames
    pub block_size: Option<u32>,
    /// Whether input monitoring is enabled
    pub monitoring_enabled: bool,
}

impl AudioSettings {
    /// Load settings, treating an absent file as defaults. A present but
    /// unreadable file is an error the caller decides about.
    pub fn load(path: &Path) -> HostResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let settings =
            serde_json::from_str(&data).map_err(|e| HostError::DecodeParse(e.to_string()))?;
        info!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> HostResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| HostError::SerializationWrite(e.to_string()))?;
        write_atomic(path, json.as_bytes())?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }
}
