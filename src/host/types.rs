//! Core types for plugin hosting
//!
//! Defines the plugin descriptor produced by format lookups and consumed by
//! instantiation, plus the host-wide error taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Semantic identity of a plugin.
///
/// Produced by a [`PluginFormat`](super::format::PluginFormat) lookup,
/// consumed by instantiation, and snapshotted into the chain document on
/// save. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Display name
    pub name: String,
    /// Format tag (e.g. "VST3", "Mock") - matched exactly against
    /// registered format handlers
    pub format_name: String,
    /// File path or bundle identifier the plugin loads from
    pub file_or_identifier: String,
    /// Manufacturer/vendor name
    pub manufacturer_name: String,
    /// Version string
    pub version: String,
    /// Whether the plugin is an instrument rather than an effect
    pub is_instrument: bool,
    /// Declared input channel count
    pub num_input_channels: usize,
    /// Declared output channel count
    pub num_output_channels: usize,
    /// Format-provided metadata beyond the explicit fields, preserved
    /// verbatim through serialization
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl fmt::Display for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.format_name)
    }
}

/// Host error taxonomy
///
/// The per-record variants (`FormatNotFound`, `FileMissing`,
/// `Instantiation`, `BusLayout`) are recovered locally during chain decode
/// by skipping the record; `DecodeParse` is the only decode failure that
/// aborts a whole load. Real-time callback faults inside a plugin are
/// deliberately absent: no safe recovery exists inside a deadline, so
/// load-time validation is the mitigation.
#[derive(Debug)]
pub enum HostError {
    /// Audio device failed to open or configure
    DeviceConfig(String),
    /// No registered format handler matches the record's format name
    FormatNotFound(String),
    /// The plugin file referenced by a record does not exist
    FileMissing(PathBuf),
    /// The format handler failed to create an instance
    Instantiation(String),
    /// The instance rejected the default bus layout
    BusLayout(String),
    /// Writing the chain document failed
    SerializationWrite(String),
    /// The chain document itself is unreadable
    DecodeParse(String),
    /// A state blob could not be restored
    State(String),
    /// IO error
    Io(std::io::Error),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::DeviceConfig(msg) => write!(f, "device configuration failed: {}", msg),
            HostError::FormatNotFound(name) => write!(f, "no plugin format named '{}'", name),
            HostError::FileMissing(path) => {
                write!(f, "plugin file not found: {}", path.display())
            }
            HostError::Instantiation(msg) => write!(f, "plugin instantiation failed: {}", msg),
            HostError::BusLayout(msg) => write!(f, "bus layout rejected: {}", msg),
            HostError::SerializationWrite(msg) => {
                write!(f, "failed to write chain document: {}", msg)
            }
            HostError::DecodeParse(msg) => write!(f, "chain document unreadable: {}", msg),
            HostError::State(msg) => write!(f, "state restore failed: {}", msg),
            HostError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for HostError {}

impl From<std::io::Error> for HostError {
    fn from(e: std::io::Error) -> Self {
        HostError::Io(e)
    }
}

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn make_descriptor() -> PluginDescriptor {
        PluginDescriptor {
            name: "Test Reverb".to_string(),
            format_name: "VST3".to_string(),
            file_or_identifier: "/path/to/reverb.vst3".to_string(),
            manufacturer_name: "Test Audio".to_string(),
            version: "1.0.0".to_string(),
            is_instrument: false,
            num_input_channels: 2,
            num_output_channels: 2,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_descriptor_display() {
        assert_eq!(format!("{}", make_descriptor()), "Test Reverb (VST3)");
    }

    #[test]
    fn test_descriptor_serde_round_trip() {
        let mut desc = make_descriptor();
        desc.extra
            .insert("category".to_string(), Value::String("Fx".to_string()));

        let json = serde_json::to_string(&desc).unwrap();
        let parsed: PluginDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, desc);
    }

    #[test]
    fn test_error_display() {
        let err = HostError::FormatNotFound("CLAP".to_string());
        assert_eq!(format!("{}", err), "no plugin format named 'CLAP'");

        let err = HostError::FileMissing(PathBuf::from("/gone.vst3"));
        assert!(format!("{}", err).contains("/gone.vst3"));
    }
}
