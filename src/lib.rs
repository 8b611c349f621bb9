//! # fxrack - live plugin chain host
//!
//! fxrack hosts third-party audio processing plugins and routes live audio
//! from an input device through the plugin chain to an output device in
//! real time, optionally mirroring the raw input to a second, independently
//! clocked monitor device. The chain's composition and every plugin's
//! opaque internal state persist across restarts.
//!
//! # Architecture
//!
//! ```text
//!  input device ──► AudioRoutingEngine ──► output device
//!                     │          │
//!                     │          └─► ProcessingChain (in place, in order)
//!                     ▼
//!                RingTransport (lock-free SPSC)
//!                     │
//!                     ▼
//!                MonitorEngine ──► monitor device
//!
//!  ProcessingChain ◄──► ChainPersistence (JSON + base64 state blobs)
//! ```
//!
//! The two device callbacks are real-time threads: they never lock, block,
//! log, or allocate (beyond one amortized scratch-buffer growth). The
//! chain is mutated on the control thread and published to the audio
//! thread as an atomically swapped immutable snapshot.
//!
//! # Quick start
//!
//! ```rust
//! use fxrack::chain::ProcessingChain;
//! use fxrack::host::mock::MockProcessor;
//! use fxrack::routing::AudioRoutingEngine;
//! use fxrack::transport::RingTransport;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! let mut chain = ProcessingChain::new();
//! chain.append(Box::new(MockProcessor::gain(0.5)));
//!
//! let (writer, _reader) = RingTransport::with_defaults();
//! let mut engine = AudioRoutingEngine::new(
//!     chain.snapshot_handle(),
//!     writer,
//!     Arc::new(AtomicBool::new(false)),
//! );
//! engine.on_device_about_to_start(48000.0, 256);
//!
//! let input = [1.0f32; 512]; // 256 stereo frames
//! let mut output = [0.0f32; 512];
//! engine.on_block(&input, 2, &mut output, 2);
//! assert!(output.iter().all(|&s| s == 0.5));
//! ```

pub mod block_buffer;
pub mod chain;
pub mod config;
pub mod device;
pub mod events;
pub mod host;
pub mod monitor;
pub mod persist;
pub mod routing;
pub mod transport;

pub use block_buffer::BlockBuffer;
pub use chain::{InstanceId, PluginInstance, ProcessingChain};
pub use config::{AudioSettings, StoragePaths};
pub use events::{ChainEvent, UiEvent};
pub use host::{HostError, HostResult, PluginCatalog, PluginDescriptor, PluginProcessor};
pub use monitor::MonitorEngine;
pub use persist::ChainPersistence;
pub use routing::AudioRoutingEngine;
pub use transport::RingTransport;
