//! Monitor device engine
//!
//! The trivial half of the monitoring pair: on each block, drain whatever
//! the transport holds into the monitor device's output and silence the
//! rest. No processing chain runs on this path - it mirrors raw input for
//! listening only. Underrun is expected steady state whenever the two
//! devices' clocks drift.

use crate::transport::TransportReader;

pub struct MonitorEngine {
    reader: TransportReader,
    scratch: Vec<f32>,
    sample_rate: f64,
    block_size: usize,
}

impl MonitorEngine {
    pub fn new(reader: TransportReader) -> Self {
        Self {
            reader,
            scratch: Vec::new(),
            sample_rate: 0.0,
            block_size: 0,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Device-ready: size the channel-mapping scratch and drop any stale
    /// frames queued while the device was down.
    pub fn on_device_about_to_start(&mut self, sample_rate: f64, block_size: usize) {
        self.sample_rate = sample_rate;
        self.block_size = block_size;
        let needed = block_size * self.reader.channels();
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0.0);
        }
        self.reader.discard_all();
    }

    /// The per-block real-time callback: fill `output` from the transport,
    /// explicitly silencing any frames or channels the read did not cover.
    pub fn on_block(&mut self, output: &mut [f32], output_channels: usize) {
        if output_channels == 0 {
            return;
        }
        let frames = output.len() / output_channels;
        let transport_channels = self.reader.channels();

        if output_channels == transport_channels {
            let got = self.reader.read(output, frames);
            output[got * output_channels..].fill(0.0);
            return;
        }

        // Channel-count mismatch: map through the scratch. Growth only
        // happens if the device delivers a larger block than negotiated.
        let needed = frames * transport_channels;
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0.0);
        }
        let got = self.reader.read(&mut self.scratch[..needed], frames);
        for frame in 0..frames {
            for ch in 0..output_channels {
                output[frame * output_channels + ch] = if frame < got && ch < transport_channels {
                    self.scratch[frame * transport_channels + ch]
                } else {
                    0.0
                };
            }
        }
    }

    /// Device stopped. Nothing is held on this side.
    pub fn on_device_stopped(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RingTransport;

    #[test]
    fn test_underrun_is_silenced() {
        let (mut writer, reader) = RingTransport::new(256, 2);
        let mut engine = MonitorEngine::new(reader);
        engine.on_device_about_to_start(48000.0, 8);

        writer.write(&[0.5f32; 6], 2, 3); // only 3 frames queued

        let mut output = [9.0f32; 16]; // 8 frames requested
        engine.on_block(&mut output, 2);
        assert_eq!(&output[..6], &[0.5; 6]);
        assert!(output[6..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_start_discards_stale_frames() {
        let (mut writer, reader) = RingTransport::new(256, 2);
        let mut engine = MonitorEngine::new(reader);

        writer.write(&[1.0f32; 32], 2, 16); // queued before the device came up
        engine.on_device_about_to_start(48000.0, 8);

        let mut output = [9.0f32; 16];
        engine.on_block(&mut output, 2);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_channel_mismatch_maps_and_silences() {
        let (mut writer, reader) = RingTransport::new(256, 2);
        let mut engine = MonitorEngine::new(reader);
        engine.on_device_about_to_start(48000.0, 4);

        // Distinct per-channel values: L=1,2 R=10,20
        writer.write(&[1.0, 10.0, 2.0, 20.0], 2, 2);

        // 4-channel monitor device: extra channels must be silent
        let mut output = [9.0f32; 8]; // 2 frames x 4 channels
        engine.on_block(&mut output, 4);
        assert_eq!(output, [1.0, 10.0, 0.0, 0.0, 2.0, 20.0, 0.0, 0.0]);
    }

    #[test]
    fn test_mono_monitor_takes_left_channel() {
        let (mut writer, reader) = RingTransport::new(256, 2);
        let mut engine = MonitorEngine::new(reader);
        engine.on_device_about_to_start(48000.0, 4);

        writer.write(&[1.0, -1.0, 2.0, -2.0], 2, 2);

        let mut output = [9.0f32; 4]; // 4 frames mono, only 2 available
        engine.on_block(&mut output, 1);
        assert_eq!(output, [1.0, 2.0, 0.0, 0.0]);
    }
}
