//! Bridge configuration
//!
//! Loaded from `~/.config/roslyn-bridge/config.toml`; a missing file means
//! defaults, a malformed file is an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use directories::BaseDirs;

use crate::error::{BridgeError, Result};

const CONFIG_DIR: &str = "roslyn-bridge";
const CONFIG_FILE: &str = "config.toml";

/// Configuration for the language server process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Path to the server binary (can use $PATH)
    pub command: String,

    /// Arguments to pass to the server
    pub args: Vec<String>,

    /// Marker files for workspace-root detection
    pub root_patterns: Vec<String>,

    /// Initialization options passed to the server
    pub init_options: serde_json::Value,

    /// Handshake request timeout in seconds
    pub timeout_secs: u64,

    /// Environment variables to set
    pub env: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: "Microsoft.CodeAnalysis.LanguageServer".to_string(),
            args: vec!["--stdio".to_string()],
            root_patterns: vec![
                "global.json".to_string(),
                "Directory.Build.props".to_string(),
                ".git".to_string(),
            ],
            init_options: serde_json::json!({}),
            // Solution load can be slow on first run.
            timeout_secs: 120,
            env: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Find the workspace root by walking up from the file's directory
    /// looking for root pattern markers; falls back to `fallback`.
    pub fn find_workspace_root(&self, file_path: &Path, fallback: &Path) -> PathBuf {
        let mut current = if file_path.is_file() {
            file_path.parent().map(|p| p.to_path_buf())
        } else {
            Some(file_path.to_path_buf())
        };

        while let Some(dir) = current {
            for pattern in &self.root_patterns {
                if dir.join(pattern).exists() {
                    return dir;
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        fallback.to_path_buf()
    }
}

/// Main bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Language this bridge tracks contexts for
    pub language_id: String,

    /// File extensions handled by the tracked language
    pub extensions: Vec<String>,

    pub server: ServerConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            language_id: "csharp".to_string(),
            extensions: vec!["cs".to_string(), "csx".to_string()],
            server: ServerConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| BridgeError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| BridgeError::Config(format!("failed to write {}: {}", path.display(), e)))
    }

    /// Load from the user config directory; missing file yields defaults.
    pub fn load_or_default() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load(&path).unwrap_or_else(|e| {
                tracing::warn!("{}", e);
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    /// Path of the user config file, if a config directory exists.
    pub fn config_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.config_dir().join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Whether a file belongs to the tracked language by extension.
    pub fn handles_path(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        self.extensions.iter().any(|e| e.to_lowercase() == ext)
    }
}
