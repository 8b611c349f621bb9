//! Mock plugin format for testing and demos
//!
//! A complete, deterministic format so the host can be exercised without
//! external plugin binaries: a `.mockfx` file is a small JSON manifest
//! declaring a DSP kind and a parameter. The processors implement the full
//! capability interface, including the opaque-state protocol (the
//! parameter as little-endian f32 bytes), so persistence round-trips are
//! observable in tests.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use tracing::warn;

use crate::block_buffer::BlockBuffer;
use crate::host::format::PluginFormat;
use crate::host::processor::PluginProcessor;
use crate::host::types::{HostError, HostResult, PluginDescriptor};

/// Format tag used in descriptors and chain documents.
pub const MOCK_FORMAT_NAME: &str = "Mock";

/// File extension claimed by the format.
pub const MOCK_EXTENSION: &str = "mockfx";

/// DSP behavior of a mock plugin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockKind {
    /// Multiply every sample by the parameter
    Gain,
    /// Add the parameter to every sample
    Offset,
    /// Leave the block untouched
    Passthrough,
}

impl MockKind {
    fn as_str(&self) -> &'static str {
        match self {
            MockKind::Gain => "gain",
            MockKind::Offset => "offset",
            MockKind::Passthrough => "passthrough",
        }
    }
}

/// On-disk manifest of a `.mockfx` plugin.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct MockManifest {
    name: String,
    kind: MockKind,
    #[serde(default = "default_amount")]
    amount: f32,
    #[serde(default)]
    manufacturer: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

fn default_amount() -> f32 {
    1.0
}

/// Write a `.mockfx` manifest. Handy for tests and demo setups.
pub fn write_mock_plugin(
    path: &Path,
    name: &str,
    kind: MockKind,
    amount: f32,
) -> std::io::Result<()> {
    let manifest = MockManifest {
        name: name.to_string(),
        kind,
        amount,
        manufacturer: None,
        version: None,
    };
    let json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, json)
}

/// The mock plugin format handler.
#[derive(Default)]
pub struct MockFormat;

impl MockFormat {
    pub fn new() -> Self {
        Self
    }

    fn read_manifest(path: &Path) -> HostResult<MockManifest> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| {
            HostError::Instantiation(format!("bad manifest {}: {}", path.display(), e))
        })
    }

    fn descriptor_for(manifest: &MockManifest, path: &Path) -> PluginDescriptor {
        let mut extra = Map::new();
        extra.insert("kind".to_string(), json!(manifest.kind.as_str()));
        extra.insert("defaultAmount".to_string(), json!(manifest.amount));

        PluginDescriptor {
            name: manifest.name.clone(),
            format_name: MOCK_FORMAT_NAME.to_string(),
            file_or_identifier: path.to_string_lossy().to_string(),
            manufacturer_name: manifest
                .manufacturer
                .clone()
                .unwrap_or_else(|| "Mock Labs".to_string()),
            version: manifest.version.clone().unwrap_or_else(|| "1.0.0".to_string()),
            is_instrument: false,
            num_input_channels: 2,
            num_output_channels: 2,
            extra,
        }
    }
}

impl PluginFormat for MockFormat {
    fn name(&self) -> &str {
        MOCK_FORMAT_NAME
    }

    fn find_plugins_in_file(&self, path: &Path) -> Vec<PluginDescriptor> {
        if path.extension().and_then(|e| e.to_str()) != Some(MOCK_EXTENSION) {
            return Vec::new();
        }
        match Self::read_manifest(path) {
            Ok(manifest) => vec![Self::descriptor_for(&manifest, path)],
            Err(e) => {
                warn!(path = %path.display(), "unreadable mock manifest: {}", e);
                Vec::new()
            }
        }
    }

    fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        _sample_rate: f64,
        _block_size: usize,
    ) -> HostResult<Box<dyn PluginProcessor>> {
        let path = Path::new(&descriptor.file_or_identifier);
        let manifest = Self::read_manifest(path)?;
        Ok(Box::new(MockProcessor {
            descriptor: Self::descriptor_for(&manifest, path),
            kind: manifest.kind,
            amount: manifest.amount,
            sample_rate: 0.0,
            block_size: 0,
            prepared: false,
            buses_enabled: false,
            reject_layout: false,
        }))
    }
}

/// A loaded mock plugin.
#[derive(Clone, Debug)]
pub struct MockProcessor {
    descriptor: PluginDescriptor,
    kind: MockKind,
    amount: f32,
    sample_rate: f64,
    block_size: usize,
    prepared: bool,
    buses_enabled: bool,
    reject_layout: bool,
}

impl MockProcessor {
    fn direct(kind: MockKind, amount: f32) -> Self {
        let name = match kind {
            MockKind::Gain => "MockGain".to_string(),
            MockKind::Offset => "MockOffset".to_string(),
            MockKind::Passthrough => "MockPassthrough".to_string(),
        };
        let mut extra = Map::new();
        extra.insert("kind".to_string(), json!(kind.as_str()));
        Self {
            descriptor: PluginDescriptor {
                name: name.clone(),
                format_name: MOCK_FORMAT_NAME.to_string(),
                file_or_identifier: format!("mock://{}", name),
                manufacturer_name: "Mock Labs".to_string(),
                version: "1.0.0".to_string(),
                is_instrument: false,
                num_input_channels: 2,
                num_output_channels: 2,
                extra,
            },
            kind,
            amount,
            sample_rate: 0.0,
            block_size: 0,
            prepared: false,
            buses_enabled: false,
            reject_layout: false,
        }
    }

    /// A gain processor with a `mock://` identifier, no file needed.
    pub fn gain(amount: f32) -> Self {
        Self::direct(MockKind::Gain, amount)
    }

    /// An offset processor with a `mock://` identifier, no file needed.
    pub fn offset(amount: f32) -> Self {
        Self::direct(MockKind::Offset, amount)
    }

    /// A do-nothing processor with a `mock://` identifier.
    pub fn passthrough() -> Self {
        Self::direct(MockKind::Passthrough, 0.0)
    }

    /// Make `negotiate_default_layout` fail, for exercising the skip path.
    pub fn rejecting_layout(mut self) -> Self {
        self.reject_layout = true;
        self
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn prepared_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn prepared_block_size(&self) -> usize {
        self.block_size
    }

    pub fn buses_enabled(&self) -> bool {
        self.buses_enabled
    }
}

impl PluginProcessor for MockProcessor {
    fn describe(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn prepare(&mut self, sample_rate: f64, block_size: usize) {
        self.sample_rate = sample_rate;
        self.block_size = block_size;
        self.prepared = true;
    }

    fn process_block(&mut self, block: &mut BlockBuffer, frames: usize) {
        match self.kind {
            MockKind::Gain => {
                for ch in 0..block.num_channels() {
                    for sample in &mut block.channel_mut(ch)[..frames] {
                        *sample *= self.amount;
                    }
                }
            }
            MockKind::Offset => {
                for ch in 0..block.num_channels() {
                    for sample in &mut block.channel_mut(ch)[..frames] {
                        *sample += self.amount;
                    }
                }
            }
            MockKind::Passthrough => {}
        }
    }

    fn release_resources(&mut self) {
        self.prepared = false;
    }

    fn state_blob(&self) -> Vec<u8> {
        self.amount.to_le_bytes().to_vec()
    }

    fn set_state_blob(&mut self, blob: &[u8]) -> HostResult<()> {
        if blob.len() < 4 {
            return Err(HostError::State(format!(
                "mock state blob too short: {} bytes",
                blob.len()
            )));
        }
        self.amount = f32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]);
        Ok(())
    }

    fn set_rate_and_block_size(&mut self, sample_rate: f64, block_size: usize) {
        self.sample_rate = sample_rate;
        self.block_size = block_size;
    }

    fn enable_default_buses(&mut self) {
        self.buses_enabled = true;
    }

    fn negotiate_default_layout(&mut self) -> bool {
        !self.reject_layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_ignores_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin.vst3");
        std::fs::write(&path, "{}").unwrap();
        assert!(MockFormat::new().find_plugins_in_file(&path).is_empty());
    }

    #[test]
    fn test_scan_reads_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warm.mockfx");
        write_mock_plugin(&path, "Warm Drive", MockKind::Gain, 1.5).unwrap();

        let descriptors = MockFormat::new().find_plugins_in_file(&path);
        assert_eq!(descriptors.len(), 1);
        let desc = &descriptors[0];
        assert_eq!(desc.name, "Warm Drive");
        assert_eq!(desc.format_name, MOCK_FORMAT_NAME);
        assert_eq!(desc.extra.get("kind").unwrap(), "gain");
    }

    #[test]
    fn test_gain_processing_in_place() {
        let mut processor = MockProcessor::gain(2.0);
        let mut block = BlockBuffer::new(2, 4);
        block.channel_mut(0).copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
        block.channel_mut(1).copy_from_slice(&[0.5, 0.5, 0.5, 0.5]);

        processor.process_block(&mut block, 4);
        assert_eq!(block.channel(0), &[2.0, 2.0, 2.0, 2.0]);
        assert_eq!(block.channel(1), &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_state_blob_round_trip() {
        let source = MockProcessor::gain(0.75);
        let blob = source.state_blob();

        let mut restored = MockProcessor::gain(1.0);
        restored.set_state_blob(&blob).unwrap();
        assert_eq!(restored.amount(), 0.75);

        assert!(restored.set_state_blob(&[1, 2]).is_err());
    }

    #[test]
    fn test_instantiate_reports_missing_file() {
        let descriptor = PluginDescriptor {
            name: "Gone".to_string(),
            format_name: MOCK_FORMAT_NAME.to_string(),
            file_or_identifier: "/nonexistent/gone.mockfx".to_string(),
            manufacturer_name: String::new(),
            version: String::new(),
            is_instrument: false,
            num_input_channels: 2,
            num_output_channels: 2,
            extra: Map::new(),
        };
        assert!(MockFormat::new()
            .instantiate(&descriptor, 44100.0, 512)
            .is_err());
    }
}
