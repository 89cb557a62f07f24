//! Error types for chunkstore
//!
//! Provides a unified error type for all store operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for chunkstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Raw store error: {0}")]
    RawStore(String),

    // -------------------------------------------------------------------------
    // Chunk Errors
    // -------------------------------------------------------------------------
    #[error("Frame error: {0}")]
    Frame(#[from] crate::txlog::FrameError),

    #[error("Invalid chunk header in {file}: {reason}")]
    ChunkHeader { file: String, reason: String },

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Failed to verify chunk file {file} in {store}")]
    VerificationFailed { store: String, file: String },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Write sequencer stopped before the job completed")]
    SequencerClosed,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
