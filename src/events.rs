//! Control-plane event plumbing
//!
//! Two channels connect the core to its UI collaborator. The chain-changed
//! notification flows outward after every structural mutation so the view
//! can refresh; it carries no payload. UI events flow inward on a queue
//! drained by the control thread - editor windows never mutate chain
//! entries directly from their own callback context, they post an event
//! addressed by the entry's stable token instead.

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::chain::InstanceId;

/// Outward notification: the chain's structure changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    Changed,
}

/// Inward UI events, addressed by stable instance tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiEvent {
    /// An editor window was opened for the instance.
    EditorOpened(InstanceId),
    /// The user closed the instance's editor window.
    EditorClosed(InstanceId),
}

pub fn chain_event_channel() -> (Sender<ChainEvent>, Receiver<ChainEvent>) {
    unbounded()
}

pub fn ui_event_channel() -> (Sender<UiEvent>, Receiver<UiEvent>) {
    unbounded()
}
