//! Chain shapes derived from built trees.

use std::collections::HashMap;

use chainsight_core::{generate_token, LevelPath};
use chainsight_tree::TraceSpanTree;
use serde::{Deserialize, Serialize};

use crate::filter::{apply_filters, SpanEntry, SpanNodeFilter, SubLevelCostCounter, DEFAULT_FILTERS};

/// Condition of one call in a chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Normal,
    /// The call failed (non-zero status or an exception).
    Abnormal,
    /// Placeholder for a span that never arrived.
    Missing,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Normal => "normal",
            NodeStatus::Abnormal => "abnormal",
            NodeStatus::Missing => "missing",
        }
    }
}

/// Whether a chain can seed a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainStatus {
    /// No call failed. Placeholders may still be present.
    Normal,
    /// At least one call failed.
    Abnormal,
}

/// One call of a chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainNode {
    pub level: LevelPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_point: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_key: Option<String>,
    pub status: NodeStatus,
    pub cost_ms: u64,
    /// Cost minus the cost of the direct callees.
    pub self_cost_ms: u64,
}

impl ChainNode {
    fn descriptor(&self) -> String {
        format!(
            "{}-{}-{}",
            self.level,
            self.view_point.as_deref().unwrap_or(""),
            self.status.as_str()
        )
    }

    /// Same call position, and the same endpoint unless one side is unknown.
    fn matches(&self, other: &ChainNode) -> bool {
        self.level == other.level
            && match (&self.view_point, &other.view_point) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

/// The shape of one finished chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Shape id: identical node sequences share it.
    pub cid: String,
    /// Group the chain was observed in (the tree's entry-viewpoint token).
    pub group_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub status: ChainStatus,
    /// Calls in depth-first order.
    pub nodes: Vec<ChainNode>,
}

impl ChainInfo {
    /// Builds a chain from annotated nodes, deriving its id and status.
    pub fn new(group_key: impl Into<String>, user_id: Option<String>, nodes: Vec<ChainNode>) -> Self {
        let desc = nodes
            .iter()
            .map(ChainNode::descriptor)
            .collect::<Vec<_>>()
            .join(";");
        let status = if nodes.iter().any(|n| n.status == NodeStatus::Abnormal) {
            ChainStatus::Abnormal
        } else {
            ChainStatus::Normal
        };

        Self {
            cid: generate_token(&desc),
            group_key: group_key.into(),
            user_id,
            status,
            nodes,
        }
    }

    /// Derives the chain of a built tree with [`DEFAULT_FILTERS`].
    pub fn from_tree(tree: &TraceSpanTree) -> Self {
        Self::from_tree_with(tree, DEFAULT_FILTERS)
    }

    pub fn from_tree_with(tree: &TraceSpanTree, filters: &[SpanNodeFilter]) -> Self {
        let mut counter = SubLevelCostCounter::new();
        let mut nodes = Vec::with_capacity(tree.len());

        for id in tree.preorder() {
            let entry = SpanEntry::from_node(tree.node(id));
            let mut node = ChainNode::default();
            counter = apply_filters(filters, &entry, &mut node, counter);
            nodes.push(node);
        }

        for node in &mut nodes {
            node.self_cost_ms = node
                .cost_ms
                .saturating_sub(counter.sub_level_cost(&node.level));
        }

        Self::new(tree.cid(), tree.user_id().map(str::to_string), nodes)
    }

    pub fn is_normal(&self) -> bool {
        self.status == ChainStatus::Normal
    }

    /// Every call of this chain appears at the same position in `other`.
    ///
    /// `other` may have calls this chain lacks, such as the tail of a trace
    /// that was truncated here.
    pub fn is_contained_by(&self, other: &ChainInfo) -> bool {
        let positions: HashMap<&LevelPath, &ChainNode> =
            other.nodes.iter().map(|n| (&n.level, n)).collect();

        self.nodes.iter().all(|node| {
            positions
                .get(&node.level)
                .is_some_and(|candidate| node.matches(candidate))
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
