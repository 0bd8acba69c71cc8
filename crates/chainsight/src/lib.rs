//! Chainsight - call-tree reconstruction and call-chain categorization for
//! distributed traces.
//!
//! This crate re-exports the building blocks and adds the two processing
//! units a batch scheduler runs:
//!
//! - [`build_chain`]: every span of one trace in, one [`ChainInfo`] out.
//! - [`categorize_group`]: every chain of one group in, one saved
//!   [`ChainRelationship`] out.
//!
//! # Example
//!
//! ```rust
//! use chainsight::{build_chain, categorize_group, InMemoryChainStore, Span};
//!
//! let chain = build_chain(vec![
//!     Span::new("t1", "", 0, "/checkout"),
//!     Span::new("t1", "0", 0, "Cart.load"),
//! ])
//! .unwrap();
//!
//! let store = InMemoryChainStore::new();
//! let key = chain.group_key.clone();
//! let summary = categorize_group(&key, vec![chain], &store).unwrap();
//! assert_eq!(summary.categories, 1);
//! ```

pub mod pipeline;

pub use chainsight_categorize::{
    filter, Categorization, CategorizeError, CategorizedChainInfo, ChainDetail, ChainInfo,
    ChainNode, ChainRelationship, ChainStatus, NodeStatus, StorePhase, UncategorizeChainInfo,
};
pub use chainsight_config::{ConfigError, JobConfig};
pub use chainsight_core::{canonical_level, generate_token, LevelError, LevelPath, Span};
pub use chainsight_store::{
    ChainDetailRecord, ChainStore, InMemoryChainStore, RelationshipRecord, SqliteChainStore,
    StoreError,
};
pub use chainsight_tree::{NodeId, SerializedNode, TraceSpanNode, TraceSpanTree, TreeError};

pub use pipeline::{
    build_chain, categorize_group, group_chains, group_traces, partition_traces, GroupSummary,
    GroupedChains, PipelineError, TraceFailure,
};
