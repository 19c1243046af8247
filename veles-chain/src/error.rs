//! Error types for the chain core

use thiserror::Error;
use veles_protocol::{AccountName, Asset};

/// Result type for chain operations
pub type Result<T> = std::result::Result<T, Error>;

/// Chain errors
///
/// Operation-level variants abort only the offending operation's block;
/// `InvariantViolation` is fatal and must halt replay (skipping a maintenance
/// step would silently diverge nodes).
#[derive(Error, Debug)]
pub enum Error {
    /// Asset arithmetic or validation failure from the protocol layer
    #[error(transparent)]
    Protocol(#[from] veles_protocol::Error),

    /// A required debit exceeds the available balance
    #[error("Insufficient balance of {account}: required {required}, available {available}")]
    InsufficientBalance {
        /// Account being debited
        account: AccountName,
        /// Amount the operation needs
        required: Asset,
        /// Amount actually held
        available: Asset,
    },

    /// Transition not permitted from the entity's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Referenced object does not exist
    #[error("{kind} not found: {key}")]
    MissingObject {
        /// Object table name
        kind: &'static str,
        /// Rendered key
        key: String,
    },

    /// Object with this key already exists
    #[error("{kind} already exists: {key}")]
    DuplicateObject {
        /// Object table name
        kind: &'static str,
        /// Rendered key
        key: String,
    },

    /// Metered action rejected and no pay-to-skip path is active
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Operation submitted before its activating hardfork
    #[error("{0} requires hardfork {1}")]
    NotActivated(&'static str, u32),

    /// Conservation or maintenance invariant broken; fatal, halt replay
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl Error {
    /// True for errors that must halt replay rather than fail one operation
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvariantViolation(_) | Error::Storage(_))
    }
}
