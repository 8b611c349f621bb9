//! The processing chain
//!
//! Ordered storage of loaded plugin instances: insertion order is
//! signal-chain order, and the index is the only chain-addressing
//! mechanism. Mutation happens on the control thread; the audio thread
//! never touches this struct. Instead, every structural change republishes
//! an immutable snapshot through an [`ArcSwap`], which the audio callback
//! loads per block with a wait-free read - it can never observe a
//! half-mutated chain.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use crossbeam::channel::Sender;
use tracing::debug;

use crate::events::{ChainEvent, UiEvent};
use crate::host::processor::{PluginProcessor, SharedProcessor};
use crate::host::types::PluginDescriptor;

/// Stable opaque token for one loaded instance.
///
/// Used only for editor back-references: a window remembers the token and
/// resolves it through the chain at use time, so entries can move or
/// disappear underneath it safely. Chain addressing itself stays
/// index-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

/// One loaded, running plugin.
pub struct PluginInstance {
    /// Stable token for UI back-references
    pub id: InstanceId,
    /// Descriptor snapshot taken at load time
    pub descriptor: PluginDescriptor,
    /// The processing handle; control-plane access locks, the audio
    /// thread only try-locks through the published snapshot
    pub processor: SharedProcessor,
    /// Whether an editor window is currently showing for this instance
    pub editor_visible: bool,
}

/// Snapshot handle loaded by the audio callback each block.
pub type ChainSnapshot = Arc<ArcSwap<Vec<SharedProcessor>>>;

/// Ordered collection of loaded plugin instances.
pub struct ProcessingChain {
    entries: Vec<PluginInstance>,
    snapshot: ChainSnapshot,
    events: Option<Sender<ChainEvent>>,
    next_id: u64,
}

impl Default for ProcessingChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingChain {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            snapshot: Arc::new(ArcSwap::from_pointee(Vec::new())),
            events: None,
            next_id: 0,
        }
    }

    /// A chain that emits [`ChainEvent::Changed`] after every mutation.
    pub fn with_events(events: Sender<ChainEvent>) -> Self {
        let mut chain = Self::new();
        chain.events = Some(events);
        chain
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PluginInstance> {
        self.entries.get(index)
    }

    /// Entries in chain order, for iteration by persistence and rendering.
    pub fn iter(&self) -> std::slice::Iter<'_, PluginInstance> {
        self.entries.iter()
    }

    /// The handle the audio engine loads per block.
    pub fn snapshot_handle(&self) -> ChainSnapshot {
        Arc::clone(&self.snapshot)
    }

    /// Add a processor to the end of the chain.
    pub fn append(&mut self, processor: Box<dyn PluginProcessor>) -> InstanceId {
        let descriptor = processor.describe().clone();
        let id = InstanceId(self.next_id);
        self.next_id += 1;

        debug!(plugin = %descriptor, index = self.entries.len(), "appending to chain");
        self.entries.push(PluginInstance {
            id,
            descriptor,
            processor: Arc::new(Mutex::new(processor)),
            editor_visible: false,
        });
        self.republish();
        self.notify();
        id
    }

    /// Remove the instance at `index`, shifting later entries down by one.
    /// Out-of-range indices are a tolerated no-op: the caller derives the
    /// index from a UI selection that can race a concurrent structural
    /// change. Returns whether anything was removed.
    pub fn remove_at(&mut self, index: usize) -> bool {
        if index >= self.entries.len() {
            debug!(index, len = self.entries.len(), "remove ignored: index out of range");
            return false;
        }
        let removed = self.entries.remove(index);
        debug!(plugin = %removed.descriptor, index, "removed from chain");
        self.republish();
        self.notify();
        true
    }

    /// Drop every instance.
    pub fn clear(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.entries.clear();
        self.republish();
        self.notify();
    }

    /// Resolve a stable token to its current index, if the instance is
    /// still in the chain.
    pub fn resolve(&self, id: InstanceId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Flip the editor-visible flag through token lookup. Returns false
    /// when the token no longer resolves.
    pub fn set_editor_visible(&mut self, id: InstanceId, visible: bool) -> bool {
        match self.resolve(id) {
            Some(index) => {
                self.entries[index].editor_visible = visible;
                true
            }
            None => false,
        }
    }

    /// Apply one UI event. Events for tokens that no longer resolve are
    /// dropped silently - the instance was removed while the event was in
    /// flight.
    pub fn handle_ui_event(&mut self, event: UiEvent) {
        let applied = match event {
            UiEvent::EditorOpened(id) => self.set_editor_visible(id, true),
            UiEvent::EditorClosed(id) => self.set_editor_visible(id, false),
        };
        if !applied {
            debug!(?event, "UI event for a removed instance, dropped");
        }
    }

    /// Call `prepare` on every entry in chain order. Control thread only.
    pub fn prepare_all(&self, sample_rate: f64, block_size: usize) {
        for entry in &self.entries {
            entry.processor.lock().unwrap().prepare(sample_rate, block_size);
        }
    }

    /// Call `release_resources` on every entry in chain order. Control
    /// thread only.
    pub fn release_all(&self) {
        for entry in &self.entries {
            entry.processor.lock().unwrap().release_resources();
        }
    }

    fn republish(&self) {
        let snapshot: Vec<SharedProcessor> = self
            .entries
            .iter()
            .map(|e| Arc::clone(&e.processor))
            .collect();
        self.snapshot.store(Arc::new(snapshot));
    }

    fn notify(&self) {
        if let Some(events) = &self.events {
            // Receiver may be gone during shutdown; that is fine
            let _ = events.send(ChainEvent::Changed);
        }
    }
}
