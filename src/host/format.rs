//! Plugin formats and the catalog
//!
//! A [`PluginFormat`] is the collaborator that knows how to discover and
//! instantiate plugins of one standard (VST3, CLAP, the in-tree mock
//! format, ...). The [`PluginCatalog`] holds the registered handlers and
//! answers the two questions the host asks: "which format claims this
//! name?" (chain decode) and "what lives in this file?" (interactive load).

use std::path::Path;

use tracing::{debug, info};

use crate::host::processor::{configure_processor, PluginProcessor};
use crate::host::types::{HostError, HostResult, PluginDescriptor};

/// A plugin-format handler.
pub trait PluginFormat: Send + Sync {
    /// Format tag, matched exactly against chain-document records.
    fn name(&self) -> &str;

    /// All plugin types found at `path`. Empty when the file is not of
    /// this format or holds nothing loadable.
    fn find_plugins_in_file(&self, path: &Path) -> Vec<PluginDescriptor>;

    /// Instantiate a processor for `descriptor` at the target rate and
    /// block size, or report why it cannot be created.
    fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        sample_rate: f64,
        block_size: usize,
    ) -> HostResult<Box<dyn PluginProcessor>>;
}

/// Registered format handlers.
#[derive(Default)]
pub struct PluginCatalog {
    formats: Vec<Box<dyn PluginFormat>>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, format: Box<dyn PluginFormat>) {
        debug!(format = format.name(), "registered plugin format");
        self.formats.push(format);
    }

    pub fn formats(&self) -> impl Iterator<Item = &dyn PluginFormat> {
        self.formats.iter().map(|f| f.as_ref())
    }

    /// Exact string match against the registered format names.
    pub fn find_format(&self, name: &str) -> Option<&dyn PluginFormat> {
        self.formats
            .iter()
            .map(|f| f.as_ref())
            .find(|f| f.name() == name)
    }

    /// Every plugin type any registered format finds at `path`.
    pub fn scan_file(&self, path: &Path) -> Vec<PluginDescriptor> {
        self.formats
            .iter()
            .flat_map(|f| f.find_plugins_in_file(path))
            .collect()
    }

    /// The interactive "user selected plugin file" path: scan `path`
    /// across the registered formats, instantiate the first plugin type
    /// found, and run it through the standard configuration sequence.
    pub fn load_file(
        &self,
        path: &Path,
        sample_rate: f64,
        block_size: usize,
    ) -> HostResult<Box<dyn PluginProcessor>> {
        for format in &self.formats {
            let descriptors = format.find_plugins_in_file(path);
            let Some(descriptor) = descriptors.first() else {
                continue;
            };
            debug!(
                plugin = %descriptor,
                format = format.name(),
                "instantiating from file"
            );
            let mut processor = format.instantiate(descriptor, sample_rate, block_size)?;
            configure_processor(processor.as_mut(), sample_rate, block_size)?;
            info!(plugin = %descriptor, "plugin loaded");
            return Ok(processor);
        }
        Err(HostError::FormatNotFound(format!(
            "no registered format recognizes {}",
            path.display()
        )))
    }
}
