//! Events exchanged between the bridge and its host.
//!
//! The server client publishes [`ServerStateChange`] as the language server
//! moves through its lifecycle; the context tracker publishes
//! [`ContextChanged`] whenever a document's effective project context is
//! resolved. Both ride on [`EventEmitter`], a thin wrapper over a tokio
//! broadcast channel: emitting with no subscribers is not an error, and a
//! lagged subscriber only loses old events, never blocks the emitter.

use tokio::sync::broadcast;

use crate::lsp::{DocumentUri, ProjectContext};

/// Lifecycle states reported for the language server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    /// Handshake finished, server is answering requests.
    Started,
    /// The server is still loading projects; open documents may sit in a
    /// miscellaneous-files context until this finishes.
    ProjectInitializationStarted,
    ProjectInitializationComplete,
}

/// Fired on every server lifecycle transition.
#[derive(Debug, Clone)]
pub struct ServerStateChange {
    pub state: ServerState,
    /// Human-readable workspace name for status display.
    pub workspace_label: String,
}

/// Fired when the effective project context for a document is resolved,
/// either by a completed refresh or an explicit user selection.
#[derive(Debug, Clone)]
pub struct ContextChanged {
    pub uri: DocumentUri,
    pub context: ProjectContext,
    /// More than one context applies to this document (multi-targeted
    /// project), so a selection UI is meaningful.
    pub has_additional_contexts: bool,
}

/// Broadcast-based event emitter.
#[derive(Debug, Clone)]
pub struct EventEmitter<T> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> EventEmitter<T> {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is fine; the event is dropped.
    pub fn emit(&self, event: T) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}
