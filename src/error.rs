//! Error kinds for the capture core
//!
//! Control-path operations (init, shutdown, thread naming, configuration)
//! surface these to the caller. Hot-path operations (guards, queue push)
//! degrade silently and only count failures.

use thiserror::Error;

/// Errors produced by the tracer, the codec and the stream reader
#[derive(Error, Debug)]
pub enum TraceError {
    /// The runtime is already running. Callers of `Tracer::init` never see
    /// this: double-init is reported as success.
    #[error("tracer already initialized")]
    AlreadyInitialized,

    #[error("transport unavailable at {path}: {source}")]
    TransportUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("thread name must not be empty")]
    InvalidThreadName,

    #[error("unsupported format version {found} (reader supports up to {max})")]
    UnsupportedFormatVersion { found: u8, max: u8 },

    #[error("unknown event kind {0}")]
    UnknownKind(u8),

    #[error("record truncated: got {len} bytes, need {}", crate::event::EVENT_SIZE)]
    Truncated { len: usize },

    #[error("capture queue full, event dropped")]
    QueueFull,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TraceError {
    /// Whether a reader should skip the offending record and keep going
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            TraceError::UnsupportedFormatVersion { .. } | TraceError::UnknownKind(_)
        )
    }
}

/// Result type for capture-core operations
pub type Result<T> = std::result::Result<T, TraceError>;
