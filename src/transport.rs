//! Lock-free transport between the two real-time audio threads
//!
//! A fixed-capacity single-producer/single-consumer frame ring bridging the
//! primary device callback (writer) and the monitor device callback
//! (reader), which run on independently clocked threads. The split
//! writer/reader halves make the SPSC contract a type-system fact: each
//! half is `Send` but not clonable, so exactly one thread can hold each
//! side.
//!
//! Backpressure policy: the writer never blocks on a slow or absent reader
//! (excess frames are silently dropped, unread data is never overwritten),
//! and the reader never blocks on a slow writer (it takes whatever is
//! available and leaves the shortfall to the caller to silence). Neither
//! condition is an error; both are steady state under clock-rate mismatch
//! between two devices.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Default transport capacity, in frames.
pub const DEFAULT_CAPACITY_FRAMES: usize = 32768;

/// Default transport channel count.
pub const DEFAULT_CHANNELS: usize = 2;

/// Constructor for the writer/reader pair. Samples are stored interleaved;
/// only whole frames ever cross the ring, so a reader can never observe a
/// torn frame.
pub struct RingTransport;

impl RingTransport {
    /// Create a transport with the given capacity and channel count,
    /// returning the producer and consumer halves.
    pub fn new(capacity_frames: usize, channels: usize) -> (TransportWriter, TransportReader) {
        assert!(channels > 0, "transport needs at least one channel");
        let ring = HeapRb::<f32>::new(capacity_frames * channels);
        let (producer, consumer) = ring.split();
        (
            TransportWriter { producer, channels },
            TransportReader { consumer, channels },
        )
    }

    /// Create a transport at the default 32768-frame stereo capacity.
    pub fn with_defaults() -> (TransportWriter, TransportReader) {
        Self::new(DEFAULT_CAPACITY_FRAMES, DEFAULT_CHANNELS)
    }
}

/// Producer half, owned by the primary device callback thread.
pub struct TransportWriter {
    producer: HeapProd<f32>,
    channels: usize,
}

impl TransportWriter {
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whole frames currently writable without overwriting unread data.
    pub fn free_frames(&self) -> usize {
        self.producer.vacant_len() / self.channels
    }

    /// Write up to `frames` frames of interleaved `source_channels`-channel
    /// audio. Non-blocking: frames beyond the currently free space are
    /// silently dropped. Transport channels with no corresponding source
    /// channel are written as silence (`source_channels == 0` writes pure
    /// silence frames). Returns the number of frames accepted.
    pub fn write(&mut self, samples: &[f32], source_channels: usize, frames: usize) -> usize {
        let frames = if source_channels > 0 {
            frames.min(samples.len() / source_channels)
        } else {
            frames
        };
        let accepted = frames.min(self.free_frames());
        let channels = self.channels;

        if source_channels == channels {
            // Matching layouts: one contiguous copy
            let pushed = self.producer.push_slice(&samples[..accepted * channels]);
            debug_assert_eq!(pushed, accepted * channels);
        } else {
            // Re-lay frames sample by sample, silence-filling the
            // channels the source does not provide
            for frame in 0..accepted {
                for ch in 0..channels {
                    let sample = if ch < source_channels {
                        samples[frame * source_channels + ch]
                    } else {
                        0.0
                    };
                    let pushed = self.producer.try_push(sample);
                    debug_assert!(pushed.is_ok());
                    let _ = pushed;
                }
            }
        }

        accepted
    }
}

/// Consumer half, owned by the monitor device callback thread.
pub struct TransportReader {
    consumer: HeapCons<f32>,
    channels: usize,
}

impl TransportReader {
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whole frames currently available to read.
    pub fn available_frames(&self) -> usize {
        self.consumer.occupied_len() / self.channels
    }

    /// Read up to `frames` frames of interleaved audio into `destination`.
    /// Non-blocking: if fewer frames are available than requested, only the
    /// available frames are copied and the shortfall is left untouched -
    /// the caller is responsible for silencing it. Returns frames read.
    pub fn read(&mut self, destination: &mut [f32], frames: usize) -> usize {
        let frames = frames.min(destination.len() / self.channels);
        let available = frames.min(self.available_frames());
        let popped = self
            .consumer
            .pop_slice(&mut destination[..available * self.channels]);
        debug_assert_eq!(popped, available * self.channels);
        available
    }

    /// Drop everything queued, e.g. when the monitor device restarts.
    /// Returns the number of frames discarded.
    pub fn discard_all(&mut self) -> usize {
        let mut samples = 0;
        while self.consumer.try_pop().is_some() {
            samples += 1;
        }
        samples / self.channels
    }
}
