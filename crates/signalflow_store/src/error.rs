// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for the persistence layer.

use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure in a durable backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded
    #[error("Failed to encode {collection}/{key}: {message}")]
    Encode {
        /// Collection name
        collection: String,
        /// Record key
        key: String,
        /// Encoder message
        message: String,
    },

    /// A stored record could not be decoded
    #[error("Failed to decode {collection}/{key}: {message}")]
    Decode {
        /// Collection name
        collection: String,
        /// Record key
        key: String,
        /// Decoder message
        message: String,
    },

    /// The write-behind worker is no longer running
    #[error("Persistence writer has shut down")]
    WriterClosed,

    /// Backend specific failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration could not be parsed
    #[error("Invalid store configuration: {0}")]
    Config(#[from] ron::error::SpannedError),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
