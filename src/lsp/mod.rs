//! Language Server Protocol client infrastructure
//!
//! Everything that talks to the Roslyn server process lives here.
//!
//! # Components
//!
//! - [`types`] - Roslyn protocol types (`_vs_*` wire names)
//! - [`protocol`] - JSON-RPC message handling
//! - [`client`] - The server process client
//! - [`document`] - Document identity and didOpen/didClose tracking
//! - [`cancel`] - Cooperative request cancellation

mod cancel;
mod client;
mod document;
mod protocol;
mod types;

pub use cancel::{CancelSource, CancelToken};
pub use client::RoslynClient;
pub use document::{language_id_for_path, DocumentTracker, DocumentUri};
pub use types::{
    GetProjectContextsParams, ProjectContext, ProjectContextList, ServerCapabilities,
    TextDocumentIdentifier, GET_PROJECT_CONTEXTS, PROJECT_INITIALIZATION_COMPLETE,
};
