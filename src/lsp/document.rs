//! Document identity and open-document tracking
//!
//! A [`DocumentUri`] is the canonical string form of a document's location
//! and the key for every per-document lookup in the bridge. Normalization
//! goes through the `url` crate so that two spellings of the same path
//! compare equal.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{BridgeError, Result};

/// Canonical, serializable identifier for a text document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentUri(String);

impl DocumentUri {
    /// Parse and normalize a URI string.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|_| BridgeError::InvalidUri(raw.to_string()))?;
        Ok(Self(url.into()))
    }

    /// Build a `file://` URI from an absolute filesystem path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let url = Url::from_file_path(path)
            .map_err(|_| BridgeError::InvalidPath(path.to_path_buf()))?;
        Ok(Self(url.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The filesystem path, for `file://` URIs.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        Url::parse(&self.0).ok()?.to_file_path().ok()
    }
}

impl fmt::Display for DocumentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Language ID for a file path, for the languages the Roslyn server owns.
pub fn language_id_for_path(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext.to_lowercase().as_str() {
        "cs" | "csx" => "csharp",
        "razor" | "cshtml" => "razor",
        _ => "plaintext",
    }
}

/// State of an open document
#[derive(Debug, Clone)]
struct DocumentState {
    /// Version number for didChange notifications
    version: i32,
    /// Hash of content for change detection
    content_hash: u64,
    language_id: String,
}

/// Tracks which documents are "open" in the LSP sense, backing the
/// didOpen/didChange/didClose bookkeeping.
#[derive(Debug, Default)]
pub struct DocumentTracker {
    open_docs: HashMap<DocumentUri, DocumentState>,
}

impl DocumentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, uri: &DocumentUri) -> bool {
        self.open_docs.contains_key(uri)
    }

    pub fn mark_open(&mut self, uri: &DocumentUri, language_id: &str, content: &str) {
        self.open_docs.insert(
            uri.clone(),
            DocumentState {
                version: 1,
                content_hash: Self::hash_content(content),
                language_id: language_id.to_string(),
            },
        );
    }

    pub fn mark_closed(&mut self, uri: &DocumentUri) {
        self.open_docs.remove(uri);
    }

    pub fn version(&self, uri: &DocumentUri) -> Option<i32> {
        self.open_docs.get(uri).map(|s| s.version)
    }

    pub fn language_id(&self, uri: &DocumentUri) -> Option<&str> {
        self.open_docs.get(uri).map(|s| s.language_id.as_str())
    }

    /// Whether the document's content differs from what the server saw last.
    pub fn needs_sync(&self, uri: &DocumentUri, content: &str) -> bool {
        match self.open_docs.get(uri) {
            Some(state) => state.content_hash != Self::hash_content(content),
            None => true,
        }
    }

    /// Bump the version after a change, returning the new version.
    pub fn update_version(&mut self, uri: &DocumentUri, content: &str) -> Option<i32> {
        let state = self.open_docs.get_mut(uri)?;
        state.version += 1;
        state.content_hash = Self::hash_content(content);
        Some(state.version)
    }

    pub fn open_documents(&self) -> Vec<&DocumentUri> {
        self.open_docs.keys().collect()
    }

    pub fn clear(&mut self) {
        self.open_docs.clear();
    }

    fn hash_content(content: &str) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        content.hash(&mut hasher);
        hasher.finish()
    }
}
