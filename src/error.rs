// Error types shared across the bridge

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// The request observed its cancellation token (superseded by a newer
    /// refresh). Recovered locally by the tracker, never user-visible.
    #[error("request cancelled")]
    Cancelled,

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("language server not running")]
    NotRunning,

    #[error("language server not initialized")]
    NotInitialized,

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("invalid document path: {0}")]
    InvalidPath(PathBuf),

    #[error("invalid document URI: {0}")]
    InvalidUri(String),

    #[error("project context list has no entry at default index {0}")]
    InvalidDefaultIndex(usize),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// True for the cooperative-cancellation signal, which callers treat
    /// as "no update" rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
