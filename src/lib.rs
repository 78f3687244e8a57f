//! Host-side bridge to the Roslyn C# language server.
//!
//! An editor host embeds this crate to get project-context tracking for C#
//! documents: spawn the server with [`RoslynClient::spawn`], hand the
//! client to a [`ProjectContextTracker`], and forward the host's
//! active-document changes into it. The tracker resolves which project
//! context (target framework) applies to the focused document, remembers
//! explicit user selections per document, and broadcasts
//! [`ContextChanged`] events the host can fold into status UI via the
//! models in [`status`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use roslyn_bridge::{
//!     ActiveDocument, BridgeConfig, EventEmitter, ProjectContextTracker, RoslynClient,
//! };
//!
//! # async fn run() -> roslyn_bridge::Result<()> {
//! let config = BridgeConfig::load_or_default();
//! let events = EventEmitter::new();
//! let client = Arc::new(
//!     RoslynClient::spawn(&config.server, std::path::Path::new("/work/MyApp"), events.clone())
//!         .await?,
//! );
//!
//! let tracker = Arc::new(ProjectContextTracker::new(client.clone(), config.language_id));
//! tracker.clone().spawn_server_listener(events.subscribe());
//!
//! let uri = client.open_document(std::path::Path::new("/work/MyApp/Program.cs"), "").await?;
//! tracker
//!     .document_activated(Some(ActiveDocument::new(uri, "csharp")))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod lsp;
pub mod status;

pub use config::{BridgeConfig, ServerConfig};
pub use context::{ActiveDocument, ProjectContextProvider, ProjectContextTracker};
pub use error::{BridgeError, Result};
pub use event::{ContextChanged, EventEmitter, ServerState, ServerStateChange};
pub use lsp::{
    CancelSource, CancelToken, DocumentUri, ProjectContext, ProjectContextList, RoslynClient,
};
pub use status::{ProjectContextStatus, WorkspaceStatus};
