//! Error types for the offscreen effect player.

use thiserror::Error;

/// Main error type for offscreen effect player operations.
#[derive(Error, Debug)]
pub enum OepError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Render target error: {0}")]
    RenderTarget(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Effect error: {0}")]
    Effect(String),

    /// Misuse of an API contract by the caller (for example unlocking a
    /// pixel buffer that is not locked).
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Engine did not finish the frame after {attempts} draw attempts")]
    DrawTimeout { attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for offscreen effect player operations.
pub type Result<T> = std::result::Result<T, OepError>;
