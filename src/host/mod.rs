//! Plugin Host Layer
//!
//! Everything needed to discover, instantiate, and drive third-party audio
//! plugins behind a uniform interface.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  PluginCatalog: registered PluginFormat handlers            │
//! │  file path -> descriptors, descriptor -> instance           │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Box<dyn PluginProcessor>: prepare, process in place,       │
//! │  release, opaque state in/out                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Concrete format adapters (VST3, CLAP, ...) live outside this crate and
//! implement [`PluginFormat`]/[`PluginProcessor`]; the in-tree
//! [`mock::MockFormat`] is a complete format used by the tests and the
//! demo binary.

pub mod format;
pub mod mock;
pub mod processor;
pub mod types;

// Re-exports for convenience
pub use format::{PluginCatalog, PluginFormat};
pub use processor::{configure_processor, PluginProcessor, SharedProcessor};
pub use types::{HostError, HostResult, PluginDescriptor};
