//! Error types for the record store.

use burrow_engine::EngineError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening or upgrading the backing database failed.
    #[error("connection failed: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// An engine operation failed.
    ///
    /// Carries the failing operation's name so callers can distinguish
    /// causes without inspecting engine internals.
    #[error("{operation} failed: {source}")]
    Engine {
        /// Name of the failing operation.
        operation: &'static str,
        /// The underlying engine error.
        #[source]
        source: EngineError,
    },

    /// An operation failed mid-transaction; all buffered effects were
    /// discarded.
    #[error("transaction aborted during {operation}: {source}")]
    TransactionAbort {
        /// Name of the failing operation.
        operation: &'static str,
        /// The underlying engine error.
        #[source]
        source: EngineError,
    },

    /// The transaction execution contract was violated.
    #[error("transaction contract violated: {message}")]
    ContractViolation {
        /// Description of the violation.
        message: String,
    },

    /// Legacy migration failed; the legacy database is preserved and
    /// migration is retried on a later open.
    #[error("migration failed: {message}")]
    Migration {
        /// Description of the failure.
        message: String,
    },

    /// A record is not usable by the store.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of the problem.
        message: String,
    },
}

impl StoreError {
    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a contract-violation error.
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
        }
    }

    /// Creates a migration error.
    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration {
            message: message.into(),
        }
    }

    /// Creates an invalid-record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Wraps an engine error with the failing operation's name.
    ///
    /// Operations attempted on a finished transaction surface as contract
    /// violations: the callback (or something it leaked to) touched the
    /// transaction after it was finalized.
    pub fn engine(operation: &'static str, source: EngineError) -> Self {
        match source {
            EngineError::TransactionFinished { state } => Self::ContractViolation {
                message: format!("operation `{operation}` on a {state} transaction"),
            },
            source => Self::Engine { operation, source },
        }
    }
}

impl From<EngineError> for StoreError {
    fn from(source: EngineError) -> Self {
        match source {
            EngineError::TransactionFinished { state } => Self::ContractViolation {
                message: format!("operation on a {state} transaction"),
            },
            source => Self::TransactionAbort {
                operation: "commit",
                source,
            },
        }
    }
}
