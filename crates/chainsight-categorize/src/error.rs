use std::fmt;

use chainsight_store::StoreError;
use thiserror::Error;

/// Which store operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    Detail,
    Relationship,
}

impl fmt::Display for StorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorePhase::Detail => f.write_str("detail"),
            StorePhase::Relationship => f.write_str("relationship"),
        }
    }
}

/// Errors from restoring or saving a chain relationship.
#[derive(Debug, Error)]
pub enum CategorizeError {
    /// The store rejected a read or write.
    #[error("chain store {phase} operation failed for group {key}: {source}")]
    Persistence {
        key: String,
        phase: StorePhase,
        #[source]
        source: StoreError,
    },

    /// A stored record could not be decoded.
    #[error("corrupt record {record} for group {key}: {reason}")]
    CorruptRecord {
        key: String,
        record: String,
        reason: String,
    },

    #[error("failed to encode chain shape: {0}")]
    Serialization(#[from] serde_json::Error),
}
