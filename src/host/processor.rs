//! The plugin processing-handle interface
//!
//! Every loaded plugin, whatever its format, is driven through the
//! [`PluginProcessor`] trait: the chain holds owned trait objects and never
//! sees a concrete adapter type. The core operations mirror a block-based
//! processor lifecycle (prepare / in-place process / release) plus the
//! opaque state protocol the persistence layer relies on; the configuration
//! operations have no-op defaults for formats without bus negotiation.

use std::sync::{Arc, Mutex};

use crate::block_buffer::BlockBuffer;
use crate::host::types::{HostError, HostResult, PluginDescriptor};

/// Capability interface implemented by plugin-format adapters.
pub trait PluginProcessor: Send {
    /// The descriptor this instance was created from.
    fn describe(&self) -> &PluginDescriptor;

    /// Called before the first block and whenever the device restarts with
    /// new parameters. Never called from a real-time thread.
    fn prepare(&mut self, sample_rate: f64, block_size: usize);

    /// Process `frames` frames in place: this entry's output becomes the
    /// next entry's input. Called on the real-time thread; must not block,
    /// allocate, or perform I/O.
    fn process_block(&mut self, block: &mut BlockBuffer, frames: usize);

    /// Called when the device stops. Never called from a real-time thread.
    fn release_resources(&mut self);

    /// The instance's opaque internal state. Empty means "no state".
    fn state_blob(&self) -> Vec<u8>;

    /// Restore state previously produced by [`state_blob`](Self::state_blob).
    fn set_state_blob(&mut self, blob: &[u8]) -> HostResult<()>;

    /// Record the target rate and block size ahead of bus negotiation.
    fn set_rate_and_block_size(&mut self, _sample_rate: f64, _block_size: usize) {}

    /// Enable the default input and output buses.
    fn enable_default_buses(&mut self) {}

    /// Negotiate the default bus layout. Returning `false` marks the
    /// instance unusable and the loader discards it.
    fn negotiate_default_layout(&mut self) -> bool {
        true
    }
}

/// Shared handle to a loaded processor. Control-plane paths take the full
/// lock (off the real-time threads); the audio callback only ever
/// try-locks and bypasses a contended entry for one block.
pub type SharedProcessor = Arc<Mutex<Box<dyn PluginProcessor>>>;

/// Drive a freshly instantiated processor through the standard
/// configuration sequence: rate/block details, default buses, layout
/// negotiation, prepare. Used by both the interactive load path and the
/// chain decoder.
pub fn configure_processor(
    processor: &mut dyn PluginProcessor,
    sample_rate: f64,
    block_size: usize,
) -> HostResult<()> {
    processor.set_rate_and_block_size(sample_rate, block_size);
    processor.enable_default_buses();
    if !processor.negotiate_default_layout() {
        return Err(HostError::BusLayout(format!(
            "{} rejected the default bus layout",
            processor.describe().name
        )));
    }
    processor.prepare(sample_rate, block_size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::MockProcessor;

    #[test]
    fn test_configure_runs_the_full_sequence() {
        let mut processor = MockProcessor::gain(1.0);
        configure_processor(&mut processor, 48000.0, 256).unwrap();
        assert!(processor.is_prepared());
        assert_eq!(processor.prepared_rate(), 48000.0);
        assert_eq!(processor.prepared_block_size(), 256);
    }

    #[test]
    fn test_configure_rejects_failed_layout() {
        let mut processor = MockProcessor::gain(1.0).rejecting_layout();
        let err = configure_processor(&mut processor, 48000.0, 256).unwrap_err();
        assert!(matches!(err, HostError::BusLayout(_)));
        assert!(!processor.is_prepared());
    }
}
