//! Categorized, pending and detail views of chains.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::chain::ChainInfo;

/// A canonical chain shape and the chains folded into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedChainInfo {
    representative: ChainInfo,
    members: BTreeSet<String>,
}

impl CategorizedChainInfo {
    /// Starts a category with `chain` as its representative and first member.
    pub fn new(chain: ChainInfo) -> Self {
        let members = BTreeSet::from([chain.cid.clone()]);
        Self {
            representative: chain,
            members,
        }
    }

    /// Category key, the representative's chain id.
    pub fn key(&self) -> &str {
        &self.representative.cid
    }

    pub fn representative(&self) -> &ChainInfo {
        &self.representative
    }

    pub fn members(&self) -> &BTreeSet<String> {
        &self.members
    }

    /// The pending chain's shape fits inside the representative.
    pub fn is_contained(&self, chain: &UncategorizeChainInfo) -> bool {
        chain.chain().is_contained_by(&self.representative)
    }

    /// The chain was already folded into this category.
    pub fn is_already_contained(&self, chain: &UncategorizeChainInfo) -> bool {
        self.members.contains(chain.cid())
    }

    /// Records the chain as a member; `false` if it already was one.
    pub fn add(&mut self, chain: &UncategorizeChainInfo) -> bool {
        self.add_member(chain.cid())
    }

    pub fn add_member(&mut self, cid: &str) -> bool {
        self.members.insert(cid.to_string())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A chain waiting for a category that contains it.
///
/// Identity is the chain id, so a chain is tracked at most once.
#[derive(Debug, Clone)]
pub struct UncategorizeChainInfo {
    chain: ChainInfo,
}

impl UncategorizeChainInfo {
    pub fn new(chain: ChainInfo) -> Self {
        Self { chain }
    }

    pub fn cid(&self) -> &str {
        &self.chain.cid
    }

    pub fn chain(&self) -> &ChainInfo {
        &self.chain
    }

    pub fn into_chain(self) -> ChainInfo {
        self.chain
    }
}

impl PartialEq for UncategorizeChainInfo {
    fn eq(&self, other: &Self) -> bool {
        self.chain.cid == other.chain.cid
    }
}

impl Eq for UncategorizeChainInfo {}

impl Hash for UncategorizeChainInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chain.cid.hash(state);
    }
}

/// Per-chain record written on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDetail {
    pub chain: ChainInfo,
    pub categorized: bool,
}

impl ChainDetail {
    pub fn new(chain: ChainInfo, categorized: bool) -> Self {
        Self { chain, categorized }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainNode, NodeStatus};
    use chainsight_core::LevelPath;
    use std::collections::HashSet;

    fn node(level: &str, view_point: Option<&str>, status: NodeStatus) -> ChainNode {
        ChainNode {
            level: LevelPath::parse(level).unwrap(),
            view_point: view_point.map(str::to_string),
            status,
            ..Default::default()
        }
    }

    fn complete() -> ChainInfo {
        ChainInfo::new(
            "g1",
            None,
            vec![
                node("0", Some("/a"), NodeStatus::Normal),
                node("0.0", Some("B.b"), NodeStatus::Normal),
                node("0.1", Some("C.c"), NodeStatus::Normal),
            ],
        )
    }

    fn partial() -> ChainInfo {
        ChainInfo::new(
            "g1",
            None,
            vec![
                node("0", Some("/a"), NodeStatus::Normal),
                node("0.0", None, NodeStatus::Missing),
                node("0.1", Some("C.c"), NodeStatus::Abnormal),
            ],
        )
    }

    #[test]
    fn test_new_category_holds_representative() {
        let category = CategorizedChainInfo::new(complete());
        assert_eq!(category.key(), complete().cid);
        assert_eq!(category.members().len(), 1);
        assert!(category.members().contains(&complete().cid));
    }

    #[test]
    fn test_contained_then_already_contained() {
        let mut category = CategorizedChainInfo::new(complete());
        let pending = UncategorizeChainInfo::new(partial());

        assert!(category.is_contained(&pending));
        assert!(!category.is_already_contained(&pending));

        assert!(category.add(&pending));
        assert!(category.is_already_contained(&pending));
        assert!(!category.add(&pending));
        assert_eq!(category.members().len(), 2);
    }

    #[test]
    fn test_uncategorized_identity_is_cid() {
        let mut set = HashSet::new();
        assert!(set.insert(UncategorizeChainInfo::new(partial())));

        let mut same_cid = partial();
        same_cid.user_id = Some("someone-else".to_string());
        assert!(!set.insert(UncategorizeChainInfo::new(same_cid)));
        assert!(set.insert(UncategorizeChainInfo::new(complete())));
    }

    #[test]
    fn test_category_bytes_round_trip() {
        let mut category = CategorizedChainInfo::new(complete());
        category.add_member("other");
        let restored = CategorizedChainInfo::from_bytes(&category.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, category);
    }
}
