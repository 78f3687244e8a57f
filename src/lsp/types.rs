//! Roslyn protocol type definitions
//!
//! The project-context surface is a Visual Studio extension to LSP, so its
//! wire names carry the `_vs_` prefix. Serde renames keep the Rust side
//! conventional while matching the server byte for byte.

use serde::{Deserialize, Serialize};

/// Request: contexts a document belongs to.
pub const GET_PROJECT_CONTEXTS: &str = "textDocument/_vs_getProjectContexts";

/// Notification: the server finished loading projects. Open documents may
/// move from the miscellaneous-files context into a real project after this.
pub const PROJECT_INITIALIZATION_COMPLETE: &str = "workspace/projectInitializationComplete";

/// Text document identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

impl TextDocumentIdentifier {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// One compilation view of a document under a specific build configuration
/// (e.g. one target framework of a multi-targeted project).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    /// Stable identifier, opaque to the client.
    #[serde(rename = "_vs_id")]
    pub id: String,
    /// Display label, e.g. "MyApp (net8.0)".
    #[serde(rename = "_vs_label")]
    pub label: String,
    #[serde(rename = "_vs_kind", default)]
    pub kind: String,
}

impl ProjectContext {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: String::new(),
        }
    }
}

/// Response envelope for [`GET_PROJECT_CONTEXTS`]: the ordered context list
/// plus the index of the server's default choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContextList {
    #[serde(rename = "_vs_projectContexts")]
    pub contexts: Vec<ProjectContext>,
    #[serde(rename = "_vs_defaultIndex")]
    pub default_index: usize,
}

impl ProjectContextList {
    /// The server's default choice, if the index is in range.
    pub fn default_context(&self) -> Option<&ProjectContext> {
        self.contexts.get(self.default_index)
    }

    /// Whether a context with the given id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.contexts.iter().any(|c| c.id == id)
    }

    /// More than one context applies to the document.
    pub fn has_additional(&self) -> bool {
        self.contexts.len() > 1
    }
}

/// Params for [`GET_PROJECT_CONTEXTS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProjectContextsParams {
    #[serde(rename = "_vs_textDocument")]
    pub text_document: TextDocumentIdentifier,
}

/// Server capabilities (subset we care about)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(
        rename = "_vs_projectContextProvider",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_context_provider: Option<bool>,
}

/// Initialize result from server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
}

/// Server info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Incoming request from server (has id, expects response)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerRequest {
    pub id: serde_json::Value, // Can be number or string
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

/// Incoming notification from server (no id)
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingNotification {
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}
