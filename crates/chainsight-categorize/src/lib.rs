//! Call-chain categorization for chainsight.
//!
//! Built trees are reduced to a [`ChainInfo`] shape, and shapes observed under
//! one group key are folded into a [`ChainRelationship`]:
//!
//! - A chain without failed calls founds or joins a category keyed by its
//!   shape id, placeholders for missing spans included.
//! - A chain with a failed call joins every category whose representative
//!   contains it, or waits as pending until such a category shows up.
//!
//! # Example
//!
//! ```rust
//! use chainsight_categorize::{Categorization, ChainInfo, ChainRelationship};
//! use chainsight_core::Span;
//! use chainsight_tree::TraceSpanTree;
//!
//! let (cid, tree) = TraceSpanTree::build(vec![
//!     Span::new("t1", "", 0, "/checkout"),
//!     Span::new("t1", "0", 0, "Cart.load"),
//! ])
//! .unwrap();
//!
//! let mut relationship = ChainRelationship::new(cid);
//! let outcome = relationship.categorize(ChainInfo::from_tree(&tree));
//! assert_eq!(outcome, Categorization::NewCategory { reconciled: 0 });
//! ```

mod category;
mod chain;
mod error;
pub mod filter;
mod relationship;

pub use category::{CategorizedChainInfo, ChainDetail, UncategorizeChainInfo};
pub use chain::{ChainInfo, ChainNode, ChainStatus, NodeStatus};
pub use error::{CategorizeError, StorePhase};
pub use relationship::{Categorization, ChainRelationship};
