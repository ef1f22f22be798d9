//! Error type shared by the parser, the tempo map and the flow engine.

use thiserror::Error;

pub type Result<T, E = FlowError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum FlowError {
    /// A chunk, event or quantity declared more bytes than remain.
    #[error("truncated input: needed {needed} byte(s), only {available} available")]
    TruncatedInput { needed: usize, available: usize },

    /// Wrong chunk tag or otherwise unreadable container structure.
    #[error("malformed MIDI container: {0}")]
    MalformedContainer(String),

    #[error("unsupported MIDI format {0} (only formats 0 and 1 are supported)")]
    UnsupportedFormat(u16),

    /// Growing a note list or the shear grid failed.
    #[error("out of memory while growing note storage")]
    OutOfMemory,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    pub(crate) fn truncated(needed: usize, available: usize) -> Self {
        FlowError::TruncatedInput { needed, available }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, FlowError::TruncatedInput { .. })
    }
}

impl From<std::collections::TryReserveError> for FlowError {
    fn from(_: std::collections::TryReserveError) -> Self {
        FlowError::OutOfMemory
    }
}
