//! Error types for the snapshot engine and service

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for engine and service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering a snapshot
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to initialize the engine
    #[error("Engine initialization failed: {0}")]
    InitializationError(String),

    /// The inbound message is not a usable job (missing or non-string `html`)
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Size fields were present but unusable. Recovered by auto-sizing.
    #[error("Invalid size: {0}")]
    InvalidSize(String),

    /// The resolved viewport has no area
    #[error("Degenerate viewport {width}x{height}")]
    DegenerateViewport { width: u32, height: u32 },

    /// The resolved viewport exceeds the configured maximum dimension
    #[error("Viewport {width}x{height} exceeds the maximum dimension {max}")]
    ViewportTooLarge { width: u32, height: u32, max: u32 },

    /// The pixel buffer could not be serialized to PNG
    #[error("PNG encoding failed: {0}")]
    EncodingFailure(String),

    /// Layout did not complete in time
    #[error("Layout timed out after {0}ms")]
    Timeout(u64),

    /// Size or paint queried before the current load finished laying out
    #[error("Layout has not completed for the current document")]
    LayoutPending,

    /// The layout tree could not be built or computed
    #[error("Layout failed: {0}")]
    LayoutFailure(String),

    /// The layout worker is gone
    #[error("Render engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Failed to execute an inline script
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// The message channel is broken
    #[error("Transport error: {0}")]
    TransportError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure categories reported to callers in error-shaped outbound records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidJob,
    InvalidSize,
    DegenerateViewport,
    ViewportTooLarge,
    EncodingFailure,
    EngineTimeout,
    EngineFailure,
    Internal,
}

impl Error {
    /// Wire-visible category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidJob(_) => ErrorKind::InvalidJob,
            Error::InvalidSize(_) => ErrorKind::InvalidSize,
            Error::DegenerateViewport { .. } => ErrorKind::DegenerateViewport,
            Error::ViewportTooLarge { .. } => ErrorKind::ViewportTooLarge,
            Error::EncodingFailure(_) => ErrorKind::EncodingFailure,
            Error::Timeout(_) => ErrorKind::EngineTimeout,
            Error::InitializationError(_)
            | Error::LayoutPending
            | Error::LayoutFailure(_)
            | Error::EngineUnavailable(_)
            | Error::ScriptError(_) => ErrorKind::EngineFailure,
            Error::TransportError(_) | Error::Json(_) => ErrorKind::Internal,
        }
    }
}
