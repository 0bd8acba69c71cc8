//! Storage records for categorized call chains.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Per-chain detail row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDetailRecord {
    /// Chain shape identifier.
    pub chain_id: String,
    /// Group the chain was observed in.
    pub group_key: String,
    /// Encoded chain shape.
    pub shape: Vec<u8>,
    /// Whether the chain belonged to a category when saved.
    pub categorized: bool,
}

/// Per-group relationship row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub group_key: String,
    /// Chains still waiting for a containing category.
    pub pending: BTreeSet<String>,
    /// Category key to encoded category.
    pub categories: BTreeMap<String, Vec<u8>>,
}

impl RelationshipRecord {
    pub fn new(group_key: impl Into<String>) -> Self {
        Self {
            group_key: group_key.into(),
            ..Default::default()
        }
    }
}
