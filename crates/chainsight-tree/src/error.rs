use chainsight_core::LevelError;
use thiserror::Error;

/// Errors from building or restoring a trace span tree.
#[derive(Debug, Error)]
pub enum TreeError {
    /// No spans were supplied for the trace.
    #[error("span list is empty")]
    EmptyInput,

    /// The entry span (empty parent level, level id 0) is missing.
    #[error("trace {trace_id}: entry span is missing, first level is {level}")]
    MalformedRoot { trace_id: String, level: String },

    /// A span's parent level could not be parsed.
    #[error("trace {trace_id}: {source}")]
    AddressResolution {
        trace_id: String,
        #[source]
        source: LevelError,
    },

    /// A level index exceeds [`MAX_LEVEL_INDEX`](crate::MAX_LEVEL_INDEX).
    #[error("trace {trace_id}: level {level} has an index above {limit}")]
    LevelOutOfRange {
        trace_id: String,
        level: String,
        limit: u32,
    },

    /// A node reference token is absent from the flat node list.
    #[error("node ref token {0} not found")]
    NodeNotFound(String),

    /// A stored tree could not be decoded.
    #[error("corrupt trace span tree: {0}")]
    Corrupt(String),

    #[error("failed to serialize trace span tree: {0}")]
    Serialize(#[from] serde_json::Error),
}
