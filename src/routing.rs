//! Primary device routing engine
//!
//! Owns the per-block real-time contract for the primary device: tap raw
//! input into the monitor transport, run the chain in place over a planar
//! scratch buffer, copy the result out. The callback never blocks, never
//! performs I/O, never logs, and allocates only through the scratch
//! buffer's amortized growth.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::block_buffer::BlockBuffer;
use crate::chain::ChainSnapshot;
use crate::transport::TransportWriter;

pub struct AudioRoutingEngine {
    chain: ChainSnapshot,
    monitor: TransportWriter,
    monitoring: Arc<AtomicBool>,
    scratch: BlockBuffer,
    sample_rate: f64,
    block_size: usize,
    prepared: bool,
}

impl AudioRoutingEngine {
    pub fn new(
        chain: ChainSnapshot,
        monitor: TransportWriter,
        monitoring: Arc<AtomicBool>,
    ) -> Self {
        Self {
            chain,
            monitor,
            monitoring,
            scratch: BlockBuffer::new(2, 0),
            sample_rate: 0.0,
            block_size: 0,
            prepared: false,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Device-ready: size the scratch buffer and prepare every chain entry
    /// in order. Runs on the control thread before the stream starts.
    /// Idempotent for repeated calls with identical parameters.
    pub fn on_device_about_to_start(&mut self, sample_rate: f64, block_size: usize) {
        if self.prepared && sample_rate == self.sample_rate && block_size == self.block_size {
            return;
        }
        self.sample_rate = sample_rate;
        self.block_size = block_size;
        self.scratch.ensure_size(2, block_size);

        for processor in self.chain.load().iter() {
            processor.lock().unwrap().prepare(sample_rate, block_size);
        }
        self.prepared = true;
    }

    /// The per-block real-time callback.
    ///
    /// `input` and `output` are interleaved device buffers. Input channels
    /// missing from the device enter the chain as silence; output channels
    /// beyond what the scratch holds leave as silence. The chain runs
    /// strictly in order, synchronously, on this thread - entry i's output
    /// is entry i+1's input. An entry whose mutex is momentarily held by
    /// the control plane is bypassed for this block rather than blocking
    /// the deadline.
    pub fn on_block(
        &mut self,
        input: &[f32],
        input_channels: usize,
        output: &mut [f32],
        output_channels: usize,
    ) {
        let out_frames = if output_channels > 0 {
            output.len() / output_channels
        } else {
            0
        };
        let frames = if input_channels > 0 {
            out_frames.min(input.len() / input_channels)
        } else {
            out_frames
        };
        if frames == 0 {
            return;
        }

        // The one allowed allocation, amortized: grow past the largest
        // extents seen so far, never per-call once warmed up
        let channels = input_channels.max(output_channels);
        self.scratch.ensure_size(channels, frames);

        // Monitor tap first, so the monitor path observes unprocessed input
        if self.monitoring.load(Ordering::Relaxed) {
            self.monitor.write(input, input_channels, frames);
        }

        self.scratch.copy_from_interleaved(input, input_channels, frames);

        let snapshot = self.chain.load();
        for processor in snapshot.iter() {
            if let Ok(mut guard) = processor.try_lock() {
                guard.process_block(&mut self.scratch, frames);
            }
        }

        self.scratch.copy_to_interleaved(output, output_channels, frames);
    }

    /// Device stopped: release every chain entry in order. Runs on the
    /// control thread after the stream has stopped.
    pub fn on_device_stopped(&mut self) {
        for processor in self.chain.load().iter() {
            processor.lock().unwrap().release_resources();
        }
        self.prepared = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ProcessingChain;
    use crate::host::mock::MockProcessor;
    use crate::transport::RingTransport;

    fn engine_for(
        chain: &ProcessingChain,
        monitoring: bool,
    ) -> (AudioRoutingEngine, crate::transport::TransportReader) {
        let (writer, reader) = RingTransport::new(4096, 2);
        let engine = AudioRoutingEngine::new(
            chain.snapshot_handle(),
            writer,
            Arc::new(AtomicBool::new(monitoring)),
        );
        (engine, reader)
    }

    #[test]
    fn test_chain_runs_in_order() {
        let mut chain = ProcessingChain::new();
        chain.append(Box::new(MockProcessor::gain(2.0)));
        chain.append(Box::new(MockProcessor::offset(0.5)));

        let (mut engine, _reader) = engine_for(&chain, false);
        engine.on_device_about_to_start(48000.0, 4);

        let input = [1.0f32; 8]; // 4 frames stereo of ones
        let mut output = [0.0f32; 8];
        engine.on_block(&input, 2, &mut output, 2);

        // offset(gain(1.0)) = 1.0 * 2.0 + 0.5; the reverse order would
        // give (1.0 + 0.5) * 2.0 = 3.0
        assert!(output.iter().all(|&s| s == 2.5));
    }

    #[test]
    fn test_monitor_sees_unprocessed_input() {
        let mut chain = ProcessingChain::new();
        chain.append(Box::new(MockProcessor::gain(10.0)));

        let (mut engine, mut reader) = engine_for(&chain, true);
        engine.on_device_about_to_start(48000.0, 4);

        let input = [0.25f32; 8];
        let mut output = [0.0f32; 8];
        engine.on_block(&input, 2, &mut output, 2);

        // Output carries the processed signal...
        assert!(output.iter().all(|&s| s == 2.5));

        // ...while the monitor transport carries the raw input
        let mut mirrored = [0.0f32; 8];
        assert_eq!(reader.read(&mut mirrored, 4), 4);
        assert_eq!(mirrored, input);
    }

    #[test]
    fn test_monitoring_disabled_writes_nothing() {
        let chain = ProcessingChain::new();
        let (mut engine, mut reader) = engine_for(&chain, false);
        engine.on_device_about_to_start(48000.0, 4);

        let input = [0.5f32; 8];
        let mut output = [0.0f32; 8];
        engine.on_block(&input, 2, &mut output, 2);
        assert_eq!(reader.available_frames(), 0);
    }

    #[test]
    fn test_missing_input_channels_are_silence() {
        let chain = ProcessingChain::new();
        let (mut engine, _reader) = engine_for(&chain, false);
        engine.on_device_about_to_start(48000.0, 2);

        // Mono input, stereo output: channel 1 must come out silent
        let input = [0.8f32, 0.6];
        let mut output = [9.0f32; 4];
        engine.on_block(&input, 1, &mut output, 2);
        assert_eq!(output, [0.8, 0.0, 0.6, 0.0]);
    }

    #[test]
    fn test_no_input_device_processes_silence() {
        let mut chain = ProcessingChain::new();
        chain.append(Box::new(MockProcessor::offset(0.25)));

        let (mut engine, _reader) = engine_for(&chain, false);
        engine.on_device_about_to_start(48000.0, 2);

        let mut output = [9.0f32; 4];
        engine.on_block(&[], 0, &mut output, 2);
        assert!(output.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_prepare_reaches_chain_entries_and_is_idempotent() {
        let mut chain = ProcessingChain::new();
        chain.append(Box::new(MockProcessor::gain(1.0)));

        let (mut engine, _reader) = engine_for(&chain, false);
        engine.on_device_about_to_start(44100.0, 512);
        engine.on_device_about_to_start(44100.0, 512); // same params: no-op

        engine.on_device_stopped();
        engine.on_device_about_to_start(96000.0, 128);
        assert_eq!(engine.sample_rate(), 96000.0);
        assert_eq!(engine.block_size(), 128);
    }

    #[test]
    fn test_scratch_grows_for_oversized_blocks() {
        let chain = ProcessingChain::new();
        let (mut engine, _reader) = engine_for(&chain, false);
        engine.on_device_about_to_start(48000.0, 4);

        // A block larger than negotiated must still route correctly
        let input: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let mut output = vec![0.0f32; 64];
        engine.on_block(&input, 2, &mut output, 2);
        assert_eq!(output, input);
    }
}
