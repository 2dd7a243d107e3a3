//! Error types for AtlasStore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for AtlasStore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Invalid state: cannot {operation} while store is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    // -------------------------------------------------------------------------
    // On-disk Structure Errors
    // -------------------------------------------------------------------------
    #[error("Store corruption detected: {0}")]
    Corruption(String),

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

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
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
