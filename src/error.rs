//! Error types for the data layer
//!
//! Fallible setup and file I/O return [`DataLayerError`]. Per-request outcomes
//! of a storage engine are reported with [`crate::disk::ReturnCode`] instead.

use thiserror::Error;

/// Result type alias using DataLayerError
pub type Result<T> = std::result::Result<T, DataLayerError>;

/// Unified error type for data layer operations
#[derive(Debug, Error)]
pub enum DataLayerError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    #[error("Log corruption detected: {0}")]
    LogCorruption(String),

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
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Disk already destroyed: {0}")]
    Destroyed(String),
}

impl From<bincode::Error> for DataLayerError {
    fn from(e: bincode::Error) -> Self {
        DataLayerError::Serialization(e.to_string())
    }
}
