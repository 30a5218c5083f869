//! Error types for palkv
//!
//! Provides a unified error type for building and reading stores.

use thiserror::Error;

/// Result type alias using PalError
pub type Result<T> = std::result::Result<T, PalError>;

/// Unified error type for palkv operations
#[derive(Debug, Error)]
pub enum PalError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Builder Errors
    // -------------------------------------------------------------------------
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Duplicate key ({key_size} bytes): 0x{key}")]
    DuplicateKey { key_size: usize, key: String },

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    // -------------------------------------------------------------------------
    // Reader Errors
    // -------------------------------------------------------------------------
    #[error("Invalid store format: {0}")]
    Format(String),

    #[error("Store corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Codec error: {0}")]
    Codec(String),
}

impl PalError {
    /// Build a duplicate-key error, rendering the key as hex
    pub(crate) fn duplicate_key(key: &[u8]) -> Self {
        let hex: String = key.iter().map(|b| format!("{:02x}", b)).collect();
        PalError::DuplicateKey {
            key_size: key.len(),
            key: hex,
        }
    }

    /// Whether this error aborts a whole build (as opposed to a single entry)
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PalError::InvalidEntry(_))
    }
}
