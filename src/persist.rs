//! Chain persistence
//!
//! Encodes the processing chain into a durable JSON document and rebuilds
//! it on load. Encoding is total: the document is written to a temporary
//! file and renamed into place, so a failed save never leaves a truncated
//! document behind. Decoding is per-record tolerant: a record whose plugin
//! file vanished, whose format is unknown, or whose instantiation fails is
//! skipped and the rest of the chain still loads - the load as a whole
//! only fails when the document itself is unreadable.
//!
//! Neither operation ever runs on a real-time thread.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::chain::ProcessingChain;
use crate::host::format::PluginCatalog;
use crate::host::processor::{configure_processor, PluginProcessor};
use crate::host::types::{HostError, HostResult, PluginDescriptor};

/// The durable chain document: plugin records in chain order. Document
/// order is authoritative on reload; each record's `index` is diagnostic.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChainDocument {
    #[serde(default)]
    pub plugins: Vec<PluginRecord>,
}

/// One serialized plugin. Legacy documents used shorter field names for a
/// few attributes; the aliases keep them loadable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecord {
    /// Position at encode time, for diagnostics only
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "format", default = "default_format_name")]
    pub format_name: String,
    #[serde(alias = "file", default)]
    pub file_or_identifier: String,
    #[serde(alias = "manufacturer", default)]
    pub manufacturer_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub is_instrument: bool,
    #[serde(alias = "numInputs", default = "default_channel_count")]
    pub num_input_channels: usize,
    #[serde(alias = "numOutputs", default = "default_channel_count")]
    pub num_output_channels: usize,
    /// Opaque plugin state, omitted when the plugin reported none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateRecord>,
    /// Format-provided attributes beyond the explicit fields, preserved
    /// verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Base64-encoded state blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateRecord {
    pub data: String,
}

fn default_format_name() -> String {
    "VST3".to_string()
}

fn default_channel_count() -> usize {
    2
}

/// Keys the explicit record fields own (current and legacy spellings).
/// Pass-through attributes may never shadow them.
const EXPLICIT_KEYS: &[&str] = &[
    "index",
    "name",
    "format",
    "file",
    "fileOrIdentifier",
    "manufacturer",
    "manufacturerName",
    "version",
    "isInstrument",
    "numInputs",
    "numInputChannels",
    "numOutputs",
    "numOutputChannels",
    "state",
];

impl PluginRecord {
    /// Snapshot a descriptor and state blob at position `index`.
    pub fn new(index: usize, descriptor: &PluginDescriptor, blob: &[u8]) -> Self {
        let mut extra = descriptor.extra.clone();
        for key in EXPLICIT_KEYS {
            extra.remove(*key);
        }
        Self {
            index,
            name: descriptor.name.clone(),
            format_name: descriptor.format_name.clone(),
            file_or_identifier: descriptor.file_or_identifier.clone(),
            manufacturer_name: descriptor.manufacturer_name.clone(),
            version: descriptor.version.clone(),
            is_instrument: descriptor.is_instrument,
            num_input_channels: descriptor.num_input_channels,
            num_output_channels: descriptor.num_output_channels,
            state: if blob.is_empty() {
                None
            } else {
                Some(StateRecord {
                    data: BASE64.encode(blob),
                })
            },
            extra,
        }
    }

    /// Resolve legacy spellings that ended up in the pass-through map
    /// (older documents wrote `file`, `manufacturer`, `numInputs`,
    /// `numOutputs`). The modern field wins when it is already populated;
    /// the legacy key is removed either way so it is not re-emitted on
    /// save.
    pub fn resolve_legacy_fields(&mut self) {
        if let Some(Value::String(s)) = self.extra.remove("file") {
            if self.file_or_identifier.is_empty() {
                self.file_or_identifier = s;
            }
        }
        if let Some(Value::String(s)) = self.extra.remove("manufacturer") {
            if self.manufacturer_name.is_empty() {
                self.manufacturer_name = s;
            }
        }
        if let Some(v) = self.extra.remove("numInputs") {
            if let Some(n) = v.as_u64() {
                self.num_input_channels = n as usize;
            }
        }
        if let Some(v) = self.extra.remove("numOutputs") {
            if let Some(n) = v.as_u64() {
                self.num_output_channels = n as usize;
            }
        }
    }

    pub fn to_descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            name: self.name.clone(),
            format_name: self.format_name.clone(),
            file_or_identifier: self.file_or_identifier.clone(),
            manufacturer_name: self.manufacturer_name.clone(),
            version: self.version.clone(),
            is_instrument: self.is_instrument,
            num_input_channels: self.num_input_channels,
            num_output_channels: self.num_output_channels,
            extra: self.extra.clone(),
        }
    }
}

/// Per-record lifecycle during decode. `Skipped` is reachable from every
/// state before `Ready`; there is no way back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStage {
    Unresolved,
    FormatMatched,
    Instantiated,
    Configured,
    Ready,
    Skipped,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadStage::Unresolved => "unresolved",
            LoadStage::FormatMatched => "format matched",
            LoadStage::Instantiated => "instantiated",
            LoadStage::Configured => "configured",
            LoadStage::Ready => "ready",
            LoadStage::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// A record the decoder gave up on, with the stage it had reached.
#[derive(Debug)]
pub struct SkippedRecord {
    pub index: usize,
    pub stage: LoadStage,
    pub reason: String,
}

/// Outcome of a successful decode.
#[derive(Debug, Default)]
pub struct DecodeSummary {
    pub loaded: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Serializer/deserializer for the chain document at one explicit path.
pub struct ChainPersistence {
    path: PathBuf,
}

impl ChainPersistence {
    /// The storage location is always passed in; this component never
    /// consults OS special folders itself.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encode the chain to disk. Total: the document appears complete at
    /// the target path or not at all.
    pub fn save(&self, chain: &ProcessingChain) -> HostResult<()> {
        let mut document = ChainDocument::default();
        for (index, entry) in chain.iter().enumerate() {
            let guard = entry.processor.lock().unwrap();
            let blob = guard.state_blob();
            debug!(
                plugin = %entry.descriptor,
                index,
                state_bytes = blob.len(),
                "encoding chain entry"
            );
            document
                .plugins
                .push(PluginRecord::new(index, guard.describe(), &blob));
        }

        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| HostError::SerializationWrite(e.to_string()))?;
        write_atomic(&self.path, json.as_bytes())?;
        info!(
            path = %self.path.display(),
            plugins = document.plugins.len(),
            "chain document saved"
        );
        Ok(())
    }

    /// Decode the document and rebuild the chain at the target sample rate
    /// and block size. Per-record failures skip that record and continue;
    /// only an unreadable document fails the load. The chain is cleared
    /// once the document parses, then entries install incrementally in
    /// document order.
    pub fn load(
        &self,
        catalog: &PluginCatalog,
        chain: &mut ProcessingChain,
        sample_rate: f64,
        block_size: usize,
    ) -> HostResult<DecodeSummary> {
        if !self.path.exists() {
            return Err(HostError::FileMissing(self.path.clone()));
        }
        let data = fs::read_to_string(&self.path)?;
        let mut document: ChainDocument =
            serde_json::from_str(&data).map_err(|e| HostError::DecodeParse(e.to_string()))?;
        for record in &mut document.plugins {
            record.resolve_legacy_fields();
        }

        chain.clear();
        let mut summary = DecodeSummary::default();
        for (position, record) in document.plugins.iter().enumerate() {
            match restore_record(catalog, record, sample_rate, block_size) {
                Ok(processor) => {
                    chain.append(processor);
                    summary.loaded += 1;
                }
                Err((stage, error)) => {
                    warn!(
                        plugin = %record.name,
                        position,
                        %stage,
                        "skipping chain entry: {}",
                        error
                    );
                    summary.skipped.push(SkippedRecord {
                        index: position,
                        stage,
                        reason: error.to_string(),
                    });
                }
            }
        }

        info!(
            path = %self.path.display(),
            loaded = summary.loaded,
            skipped = summary.skipped.len(),
            "chain document loaded"
        );
        Ok(summary)
    }
}

/// Walk one record through `Unresolved -> FormatMatched -> Instantiated ->
/// Configured -> Ready`; any failure reports the stage that had been
/// reached.
fn restore_record(
    catalog: &PluginCatalog,
    record: &PluginRecord,
    sample_rate: f64,
    block_size: usize,
) -> Result<Box<dyn PluginProcessor>, (LoadStage, HostError)> {
    let mut stage = LoadStage::Unresolved;

    let path = Path::new(&record.file_or_identifier);
    if !path.exists() {
        return Err((stage, HostError::FileMissing(path.to_path_buf())));
    }

    let format = catalog
        .find_format(&record.format_name)
        .ok_or((stage, HostError::FormatNotFound(record.format_name.clone())))?;
    stage = LoadStage::FormatMatched;

    let descriptor = record.to_descriptor();
    let mut processor = match format.instantiate(&descriptor, sample_rate, block_size) {
        Ok(processor) => processor,
        Err(first_error) => {
            // The stored descriptor may be stale; rescan the file and
            // retry with whatever the format reports today
            debug!(
                plugin = %record.name,
                "instantiation failed ({}), rescanning {}",
                first_error,
                path.display()
            );
            let rescanned = format.find_plugins_in_file(path);
            let Some(fallback) = rescanned.first() else {
                return Err((stage, first_error));
            };
            format
                .instantiate(fallback, sample_rate, block_size)
                .map_err(|e| (stage, e))?
        }
    };
    stage = LoadStage::Instantiated;

    configure_processor(processor.as_mut(), sample_rate, block_size).map_err(|e| (stage, e))?;

    if let Some(state) = &record.state {
        match BASE64.decode(&state.data) {
            Ok(blob) if !blob.is_empty() => {
                if let Err(e) = processor.set_state_blob(&blob) {
                    // Restoring state is best-effort; the instance stays
                    warn!(plugin = %record.name, "state restore failed: {}", e);
                } else {
                    debug!(plugin = %record.name, bytes = blob.len(), "state restored");
                }
            }
            Ok(_) => debug!(plugin = %record.name, "state blob empty"),
            Err(e) => warn!(plugin = %record.name, "undecodable state blob: {}", e),
        }
    }

    Ok(processor)
}

/// Write to a sibling temporary file, then rename into place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> HostResult<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = parent {
        fs::create_dir_all(dir).map_err(|e| HostError::SerializationWrite(e.to_string()))?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| HostError::SerializationWrite(format!("bad path: {}", path.display())))?;
    let tmp = path.with_file_name(format!("{}.tmp", file_name));

    fs::write(&tmp, bytes).map_err(|e| HostError::SerializationWrite(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        HostError::SerializationWrite(e.to_string())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{write_mock_plugin, MockFormat, MockKind};
    use tempfile::TempDir;

    fn mock_catalog() -> PluginCatalog {
        let mut catalog = PluginCatalog::new();
        catalog.register(Box::new(MockFormat::new()));
        catalog
    }

    fn chain_with_plugins(dir: &TempDir, catalog: &PluginCatalog) -> ProcessingChain {
        let gain_path = dir.path().join("gain.mockfx");
        let offset_path = dir.path().join("offset.mockfx");
        write_mock_plugin(&gain_path, "Boost", MockKind::Gain, 2.0).unwrap();
        write_mock_plugin(&offset_path, "Lift", MockKind::Offset, 0.5).unwrap();

        let mut chain = ProcessingChain::new();
        chain.append(catalog.load_file(&gain_path, 44100.0, 512).unwrap());
        chain.append(catalog.load_file(&offset_path, 44100.0, 512).unwrap());
        chain
    }

    #[test]
    fn test_round_trip_preserves_order_descriptors_and_state() {
        let dir = TempDir::new().unwrap();
        let catalog = mock_catalog();
        let chain = chain_with_plugins(&dir, &catalog);

        // Tweak the first plugin's state away from its manifest default so
        // the blob, not a fresh instantiation, must carry it back
        chain
            .get(0)
            .unwrap()
            .processor
            .lock()
            .unwrap()
            .set_state_blob(&3.5f32.to_le_bytes())
            .unwrap();

        let persistence = ChainPersistence::new(dir.path().join("chain.json"));
        persistence.save(&chain).unwrap();

        let mut restored = ProcessingChain::new();
        let summary = persistence
            .load(&catalog, &mut restored, 44100.0, 512)
            .unwrap();
        assert_eq!(summary.loaded, 2);
        assert!(summary.skipped.is_empty());

        let first = restored.get(0).unwrap();
        let second = restored.get(1).unwrap();
        assert_eq!(first.descriptor.name, "Boost");
        assert_eq!(second.descriptor.name, "Lift");
        assert_eq!(first.descriptor.format_name, "Mock");
        assert_eq!(first.descriptor.extra.get("kind").unwrap(), "gain");

        // Observably equal state: the restored blob equals the saved one
        let blob = first.processor.lock().unwrap().state_blob();
        assert_eq!(blob, 3.5f32.to_le_bytes());
    }

    #[test]
    fn test_partial_failure_skips_only_the_broken_record() {
        let dir = TempDir::new().unwrap();
        let catalog = mock_catalog();

        let a = dir.path().join("a.mockfx");
        let c = dir.path().join("c.mockfx");
        write_mock_plugin(&a, "First", MockKind::Gain, 1.0).unwrap();
        write_mock_plugin(&c, "Third", MockKind::Offset, 0.1).unwrap();

        let mut document = ChainDocument::default();
        for (i, (name, path)) in [
            ("First", a.to_string_lossy().to_string()),
            ("Missing", dir.path().join("gone.mockfx").to_string_lossy().to_string()),
            ("Third", c.to_string_lossy().to_string()),
        ]
        .iter()
        .enumerate()
        {
            document.plugins.push(PluginRecord {
                index: i,
                name: name.to_string(),
                format_name: "Mock".to_string(),
                file_or_identifier: path.clone(),
                manufacturer_name: "Mock Labs".to_string(),
                version: "1.0.0".to_string(),
                is_instrument: false,
                num_input_channels: 2,
                num_output_channels: 2,
                state: None,
                extra: Map::new(),
            });
        }

        let doc_path = dir.path().join("chain.json");
        fs::write(&doc_path, serde_json::to_string_pretty(&document).unwrap()).unwrap();

        let persistence = ChainPersistence::new(doc_path);
        let mut chain = ProcessingChain::new();
        let summary = persistence.load(&catalog, &mut chain, 48000.0, 256).unwrap();

        // The decode as a whole still succeeds, in original relative order
        assert_eq!(summary.loaded, 2);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.get(0).unwrap().descriptor.name, "First");
        assert_eq!(chain.get(1).unwrap().descriptor.name, "Third");

        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].index, 1);
        assert!(summary.skipped[0].reason.contains("not found"));
    }

    #[test]
    fn test_legacy_field_aliases_still_load() {
        let dir = TempDir::new().unwrap();
        let plugin_path = dir.path().join("old.mockfx");
        write_mock_plugin(&plugin_path, "Oldie", MockKind::Gain, 1.2).unwrap();

        let json = format!(
            r#"{{
  "plugins": [
    {{
      "name": "Oldie",
      "format": "Mock",
      "file": {path},
      "manufacturer": "Mock Labs",
      "version": "0.9",
      "numInputs": 1,
      "numOutputs": 1
    }}
  ]
}}"#,
            path = serde_json::to_string(&plugin_path.to_string_lossy()).unwrap()
        );

        let mut document: ChainDocument = serde_json::from_str(&json).unwrap();
        let record = &mut document.plugins[0];
        record.resolve_legacy_fields();
        assert_eq!(record.file_or_identifier, plugin_path.to_string_lossy().to_string());
        assert_eq!(record.manufacturer_name, "Mock Labs");
        assert_eq!(record.num_input_channels, 1);
        assert_eq!(record.num_output_channels, 1);
        assert!(!record.is_instrument); // defaulted
        assert!(!record.extra.contains_key("file")); // legacy key consumed

        // And the full load path accepts the legacy document
        let doc_path = dir.path().join("chain.json");
        fs::write(&doc_path, &json).unwrap();
        let mut chain = ProcessingChain::new();
        let summary = ChainPersistence::new(doc_path)
            .load(&mock_catalog(), &mut chain, 44100.0, 512)
            .unwrap();
        assert_eq!(summary.loaded, 1);
    }

    #[test]
    fn test_missing_format_defaults_to_vst3_and_skips() {
        let dir = TempDir::new().unwrap();
        let plugin_path = dir.path().join("p.mockfx");
        write_mock_plugin(&plugin_path, "P", MockKind::Gain, 1.0).unwrap();

        // No "format" field at all: decodes as VST3, which is unregistered
        let json = format!(
            r#"{{"plugins": [{{"name": "P", "fileOrIdentifier": {path}}}]}}"#,
            path = serde_json::to_string(&plugin_path.to_string_lossy()).unwrap()
        );
        let doc_path = dir.path().join("chain.json");
        fs::write(&doc_path, &json).unwrap();

        let mut chain = ProcessingChain::new();
        let summary = ChainPersistence::new(doc_path)
            .load(&mock_catalog(), &mut chain, 44100.0, 512)
            .unwrap();
        assert_eq!(summary.loaded, 0);
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].reason.contains("VST3"));
    }

    #[test]
    fn test_unparseable_document_fails_the_whole_load() {
        let dir = TempDir::new().unwrap();
        let doc_path = dir.path().join("chain.json");
        fs::write(&doc_path, "{ this is not json").unwrap();

        let mut chain = ProcessingChain::new();
        chain.append(Box::new(crate::host::mock::MockProcessor::gain(1.0)));

        let err = ChainPersistence::new(doc_path)
            .load(&mock_catalog(), &mut chain, 44100.0, 512)
            .unwrap_err();
        assert!(matches!(err, HostError::DecodeParse(_)));
        // A failed parse must not have touched the existing chain
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_absent_document_is_reported_distinctly() {
        let dir = TempDir::new().unwrap();
        let persistence = ChainPersistence::new(dir.path().join("never-saved.json"));
        let mut chain = ProcessingChain::new();
        let err = persistence
            .load(&mock_catalog(), &mut chain, 44100.0, 512)
            .unwrap_err();
        assert!(matches!(err, HostError::FileMissing(_)));
    }

    #[test]
    fn test_pass_through_attributes_survive_and_never_shadow() {
        let desc = PluginDescriptor {
            name: "X".to_string(),
            format_name: "Mock".to_string(),
            file_or_identifier: "/x.mockfx".to_string(),
            manufacturer_name: "M".to_string(),
            version: "1".to_string(),
            is_instrument: false,
            num_input_channels: 2,
            num_output_channels: 2,
            extra: {
                let mut m = Map::new();
                m.insert("uid".to_string(), Value::String("1234".to_string()));
                // A malicious/buggy format exposing an explicit key must
                // not overwrite the explicit field
                m.insert("name".to_string(), Value::String("Shadow".to_string()));
                m
            },
        };
        let record = PluginRecord::new(0, &desc, &[]);
        assert_eq!(record.name, "X");
        assert!(!record.extra.contains_key("name"));
        assert_eq!(record.extra.get("uid").unwrap(), "1234");

        let json = serde_json::to_string(&record).unwrap();
        let parsed: PluginRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.extra.get("uid").unwrap(), "1234");
    }

    #[test]
    fn test_save_leaves_no_temporary_file() {
        let dir = TempDir::new().unwrap();
        let catalog = mock_catalog();
        let chain = chain_with_plugins(&dir, &catalog);

        let doc_path = dir.path().join("state").join("chain.json");
        ChainPersistence::new(doc_path.clone()).save(&chain).unwrap();

        assert!(doc_path.exists());
        let siblings: Vec<_> = fs::read_dir(doc_path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(siblings, ["chain.json"]);
    }

    #[test]
    fn test_empty_state_blob_is_omitted() {
        let desc = PluginDescriptor {
            name: "NoState".to_string(),
            format_name: "Mock".to_string(),
            file_or_identifier: "/n.mockfx".to_string(),
            manufacturer_name: "M".to_string(),
            version: "1".to_string(),
            is_instrument: false,
            num_input_channels: 2,
            num_output_channels: 2,
            extra: Map::new(),
        };
        let record = PluginRecord::new(0, &desc, &[]);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("\"state\""));
    }
}
