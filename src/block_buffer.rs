//! Planar scratch buffer for the block-processing path
//!
//! The routing engine processes audio as per-channel (planar) slices while
//! the devices deliver interleaved frames, so this buffer owns the
//! conversion in both directions. Allocation is grow-only: the buffer is
//! sized at device start and only ever grows if a later block exceeds the
//! extents seen so far, which keeps the steady-state callback allocation
//! free.

/// Reusable planar audio buffer.
pub struct BlockBuffer {
    data: Vec<Vec<f32>>,
    capacity_frames: usize,
}

impl BlockBuffer {
    /// Create a buffer holding `channels` channels of `frames` samples.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            data: (0..channels).map(|_| vec![0.0; frames]).collect(),
            capacity_frames: frames,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.data.len()
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    /// Grow to at least `channels` x `frames`. Never shrinks.
    pub fn ensure_size(&mut self, channels: usize, frames: usize) {
        if frames > self.capacity_frames {
            self.capacity_frames = frames;
            for channel in &mut self.data {
                channel.resize(frames, 0.0);
            }
        }
        while self.data.len() < channels {
            self.data.push(vec![0.0; self.capacity_frames]);
        }
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.data[channel]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.data[channel]
    }

    /// Zero every sample.
    pub fn clear(&mut self) {
        for channel in &mut self.data {
            channel.fill(0.0);
        }
    }

    /// Deinterleave `frames` frames of `source_channels`-channel input into
    /// this buffer. Destination channels with no corresponding source are
    /// silence-filled.
    pub fn copy_from_interleaved(&mut self, input: &[f32], source_channels: usize, frames: usize) {
        debug_assert!(frames <= self.capacity_frames);
        for (ch, channel) in self.data.iter_mut().enumerate() {
            if ch < source_channels {
                for frame in 0..frames {
                    channel[frame] = input[frame * source_channels + ch];
                }
            } else {
                channel[..frames].fill(0.0);
            }
        }
    }

    /// Interleave `frames` frames into `dest_channels`-channel output.
    /// Output channels beyond what this buffer holds are zero-filled.
    pub fn copy_to_interleaved(&self, output: &mut [f32], dest_channels: usize, frames: usize) {
        for frame in 0..frames {
            for ch in 0..dest_channels {
                output[frame * dest_channels + ch] = if ch < self.data.len() {
                    self.data[ch][frame]
                } else {
                    0.0
                };
            }
        }
    }
}
