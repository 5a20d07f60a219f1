//! Error types for FutureKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using FutureKvError
pub type Result<T> = std::result::Result<T, FutureKvError>;

/// Unified error type for FutureKV operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FutureKvError {
    // -------------------------------------------------------------------------
    // Waiting Errors
    // -------------------------------------------------------------------------
    #[error("Timed out waiting for value")]
    Timeout,

    #[error("Value was already taken from this promise")]
    AlreadyTaken,

    #[error("Map dropped before the value was resolved")]
    MapDropped,

    // -------------------------------------------------------------------------
    // Producer Errors
    // -------------------------------------------------------------------------
    #[error("Producer panicked: {0}")]
    ProducerPanicked(String),

    #[error("Executor error: {0}")]
    Executor(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
