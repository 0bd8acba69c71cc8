//! Call-tree reconstruction for chainsight.
//!
//! [`TraceSpanTree::build`] takes every span of one trace and rebuilds the
//! call tree they describe. Spans only carry a dotted level address, so the
//! builder infers missing intermediate calls as *visual* placeholder nodes and
//! merges the client and server sides of a call into one node.
//!
//! Nodes live in a flat arena and link to each other by [`NodeId`]. Each node
//! also carries a reference token that stays stable across merges and is used
//! for the serialized, token-addressed form of the tree.
//!
//! # Example
//!
//! ```rust
//! use chainsight_core::Span;
//! use chainsight_tree::TraceSpanTree;
//!
//! let spans = vec![
//!     Span::new("t1", "", 0, "/checkout"),
//!     Span::new("t1", "0", 0, "CartService.load"),
//! ];
//! let (cid, tree) = TraceSpanTree::build(spans).unwrap();
//! assert_eq!(cid, tree.cid());
//! assert_eq!(tree.len(), 2);
//! ```

mod error;
mod node;
mod tree;

pub use error::TreeError;
pub use node::{NodeId, SerializedNode, TraceSpanNode};
pub use tree::{Preorder, TraceSpanTree, MAX_LEVEL_INDEX};
