//! Host-facing status models
//!
//! Pure state for the two status-bar items an editor host typically shows:
//! the workspace's load state and the active file's project context. The
//! host folds bridge events in and renders however it likes; no UI here.

use crate::event::{ContextChanged, ServerState, ServerStateChange};
use crate::lsp::DocumentUri;

/// Workspace load status: a label plus a busy flag while the project
/// system is still loading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceStatus {
    pub label: String,
    pub busy: bool,
}

impl WorkspaceStatus {
    pub fn apply(&mut self, event: &ServerStateChange) {
        self.label = event.workspace_label.clone();
        self.busy = event.state == ServerState::ProjectInitializationStarted;
    }
}

/// Project context of the active file: display text plus whether a
/// context-selection action makes sense (more than one context applies).
#[derive(Debug, Clone, Default)]
pub struct ProjectContextStatus {
    active: Option<DocumentUri>,
    pub text: String,
    pub selectable: bool,
}

impl ProjectContextStatus {
    /// Tell the model which document is focused; context events for other
    /// documents are ignored.
    pub fn set_active_document(&mut self, uri: Option<DocumentUri>) {
        self.active = uri;
    }

    pub fn apply(&mut self, event: &ContextChanged) {
        if self.active.as_ref() == Some(&event.uri) {
            self.text = event.context.label.clone();
            self.selectable = event.has_additional_contexts;
        }
    }
}
