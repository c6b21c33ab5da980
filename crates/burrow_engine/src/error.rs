//! Error types for the store engine.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O error from the persistence backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A persisted snapshot could not be decoded.
    #[error("snapshot corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The named object store does not exist.
    #[error("store not found: {name}")]
    StoreNotFound {
        /// Name of the missing store.
        name: String,
    },

    /// The named object store already exists.
    #[error("store already exists: {name}")]
    StoreExists {
        /// Name of the conflicting store.
        name: String,
    },

    /// The named index does not exist on the store.
    #[error("index not found: {store}.{name}")]
    IndexNotFound {
        /// Store the index was looked up on.
        store: String,
        /// Name of the missing index.
        name: String,
    },

    /// A value could not be used as key material.
    #[error("bad key material: {message}")]
    Data {
        /// Description of the problem.
        message: String,
    },

    /// A database name is not usable by the backend.
    #[error("invalid database name: {name}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// An open requested a version lower than the stored one.
    #[error("version downgrade: database is at v{current}, v{requested} requested")]
    VersionDowngrade {
        /// The stored schema version.
        current: u32,
        /// The requested schema version.
        requested: u32,
    },

    /// An operation was attempted on a finished transaction.
    #[error("transaction is already {state}")]
    TransactionFinished {
        /// The terminal state the transaction reached.
        state: &'static str,
    },
}

impl EngineError {
    /// Creates a corrupted-snapshot error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a bad-key-material error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a store-not-found error.
    pub fn store_not_found(name: impl Into<String>) -> Self {
        Self::StoreNotFound { name: name.into() }
    }

    /// Creates an index-not-found error.
    pub fn index_not_found(store: impl Into<String>, name: impl Into<String>) -> Self {
        Self::IndexNotFound {
            store: store.into(),
            name: name.into(),
        }
    }
}
