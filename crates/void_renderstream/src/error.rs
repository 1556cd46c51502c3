//! Error types for the frame exchange engine

use thiserror::Error;
use void_renderstream_sys::RenderStreamError;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised by the frame exchange engine
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Error reported by, or on the way to, the plugin
    #[error(transparent)]
    Native(#[from] RenderStreamError),

    /// A bound field needs more flat values than the frame carries
    #[error("Parameter '{key}' needs {needed} values at offset {offset}, only {available} available")]
    OutOfRange {
        key: String,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Scene index {index} out of range ({count} scenes)")]
    SceneOutOfRange { index: u32, count: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),
}

impl BridgeError {
    /// Whether the session must stop
    pub fn is_session_ending(&self) -> bool {
        matches!(self, BridgeError::Native(err) if err.is_session_ending())
    }
}
