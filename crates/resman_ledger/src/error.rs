//! Error types for ledger operations.

use std::io;
use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The ledger log is corrupted.
    #[error("ledger corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Byte offset of the bad record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A key component contains the reserved delimiter or the key is malformed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Another process holds the ledger file.
    #[error("ledger locked: another process has exclusive access")]
    Locked,
}

impl LedgerError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }
}
