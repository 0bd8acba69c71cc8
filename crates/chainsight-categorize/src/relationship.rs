//! Per-group chain categorization.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chainsight_store::{ChainDetailRecord, ChainStore, RelationshipRecord};

use crate::category::{CategorizedChainInfo, ChainDetail, UncategorizeChainInfo};
use crate::chain::ChainInfo;
use crate::error::{CategorizeError, StorePhase};

/// What [`ChainRelationship::categorize`] did with a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Categorization {
    /// A normal chain started a new category.
    NewCategory { reconciled: usize },
    /// A normal chain matched an existing category.
    ExistingCategory { reconciled: usize },
    /// An abnormal chain was folded into one or more categories.
    Absorbed { categories: usize },
    /// An abnormal chain was already a member of a containing category.
    AlreadyContained,
    /// An abnormal chain fits no category yet.
    Pending,
    /// An abnormal chain was already pending.
    AlreadyPending,
}

/// Categorization state of one group for one processing pass.
///
/// Not shared across threads; a scheduler runs one group end to end and
/// then calls [`save`](Self::save).
#[derive(Debug, Clone)]
pub struct ChainRelationship {
    key: String,
    categorized: BTreeMap<String, CategorizedChainInfo>,
    uncategorized: HashSet<UncategorizeChainInfo>,
    details: BTreeMap<String, ChainDetail>,
}

impl ChainRelationship {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            categorized: BTreeMap::new(),
            uncategorized: HashSet::new(),
            details: BTreeMap::new(),
        }
    }

    /// Reloads the categories and pending chains saved for `key`.
    ///
    /// Starts empty when nothing was saved yet. Pending chains are reloaded
    /// with their details so a later reconciliation rewrites them.
    pub fn restore(key: impl Into<String>, store: &dyn ChainStore) -> Result<Self, CategorizeError> {
        let mut relationship = Self::new(key);
        let key = relationship.key.clone();

        let record = store.load_chain_relationship(&key).map_err(|source| {
            tracing::error!(group_key = %key, error = %source, "Failed to load chain relationship");
            CategorizeError::Persistence {
                key: key.clone(),
                phase: StorePhase::Relationship,
                source,
            }
        })?;
        let Some(record) = record else {
            return Ok(relationship);
        };

        for (category_key, shape) in &record.categories {
            let category = CategorizedChainInfo::from_bytes(shape)
                .map_err(|e| relationship.corrupt(category_key, e.to_string()))?;
            relationship.add_categorized(category_key.clone(), category);
        }

        let pending_ids: Vec<String> = record.pending.iter().cloned().collect();
        let stored = store.load_chain_details(&pending_ids).map_err(|source| {
            tracing::error!(group_key = %key, error = %source, "Failed to load pending chain details");
            CategorizeError::Persistence {
                key: key.clone(),
                phase: StorePhase::Detail,
                source,
            }
        })?;

        let mut pending = Vec::with_capacity(stored.len());
        for detail in stored {
            let chain = ChainInfo::from_bytes(&detail.shape)
                .map_err(|e| relationship.corrupt(&detail.chain_id, e.to_string()))?;
            pending.push(UncategorizeChainInfo::new(chain));
        }
        if let Some(missing) = record
            .pending
            .iter()
            .find(|id| !pending.iter().any(|p| p.cid() == id.as_str()))
        {
            return Err(relationship.corrupt(missing, "pending chain has no detail row".to_string()));
        }
        relationship.add_uncategorized(pending);

        tracing::debug!(
            group_key = %relationship.key,
            categories = relationship.categorized.len(),
            pending = relationship.uncategorized.len(),
            "Restored chain relationship"
        );
        Ok(relationship)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn categories(&self) -> &BTreeMap<String, CategorizedChainInfo> {
        &self.categorized
    }

    pub fn category(&self, key: &str) -> Option<&CategorizedChainInfo> {
        self.categorized.get(key)
    }

    /// Ids of chains still waiting for a category, in order.
    pub fn pending_ids(&self) -> BTreeSet<String> {
        self.uncategorized
            .iter()
            .map(|c| c.cid().to_string())
            .collect()
    }

    pub fn is_pending(&self, cid: &str) -> bool {
        self.uncategorized.iter().any(|c| c.cid() == cid)
    }

    pub fn details(&self) -> &BTreeMap<String, ChainDetail> {
        &self.details
    }

    pub fn detail(&self, cid: &str) -> Option<&ChainDetail> {
        self.details.get(cid)
    }

    /// Installs a previously saved category.
    pub fn add_categorized(&mut self, key: String, category: CategorizedChainInfo) {
        self.categorized.insert(key, category);
    }

    /// Installs previously saved pending chains.
    pub fn add_uncategorized(&mut self, chains: impl IntoIterator<Item = UncategorizeChainInfo>) {
        for chain in chains {
            self.details
                .insert(chain.cid().to_string(), ChainDetail::new(chain.chain().clone(), false));
            self.uncategorized.insert(chain);
        }
    }

    /// Folds one chain into the group.
    ///
    /// A normal chain joins (or founds) the category keyed by its id, and
    /// every pending chain that category contains is absorbed. An abnormal
    /// chain joins each category that contains it, or waits as pending.
    pub fn categorize(&mut self, chain: ChainInfo) -> Categorization {
        if chain.is_normal() {
            self.categorize_normal(chain)
        } else {
            self.categorize_abnormal(UncategorizeChainInfo::new(chain))
        }
    }

    fn categorize_normal(&mut self, chain: ChainInfo) -> Categorization {
        let key = chain.cid.clone();
        let created = !self.categorized.contains_key(&key);

        self.details
            .insert(key.clone(), ChainDetail::new(chain.clone(), true));
        let category = self
            .categorized
            .entry(key.clone())
            .or_insert_with(|| CategorizedChainInfo::new(chain));

        let mut reconciled = Vec::new();
        self.uncategorized.retain(|pending| {
            if !category.is_contained(pending) {
                return true;
            }
            category.add(pending);
            reconciled.push(pending.cid().to_string());
            false
        });

        for cid in &reconciled {
            if let Some(detail) = self.details.get_mut(cid) {
                detail.categorized = true;
            }
        }

        if !reconciled.is_empty() {
            tracing::info!(
                group_key = %self.key,
                category = %key,
                reconciled = reconciled.len(),
                "Reconciled pending chains into category"
            );
        }

        let reconciled = reconciled.len();
        if created {
            tracing::debug!(group_key = %self.key, category = %key, "New chain category");
            Categorization::NewCategory { reconciled }
        } else {
            Categorization::ExistingCategory { reconciled }
        }
    }

    fn categorize_abnormal(&mut self, candidate: UncategorizeChainInfo) -> Categorization {
        let mut contained = false;
        let mut absorbed = 0;

        for (key, category) in self.categorized.iter_mut() {
            if category.is_already_contained(&candidate) {
                contained = true;
            } else if category.is_contained(&candidate) {
                tracing::info!(
                    group_key = %self.key,
                    category = %key,
                    cid = %candidate.cid(),
                    "Chain contained by category"
                );
                category.add(&candidate);
                absorbed += 1;
                contained = true;
            }
        }

        if absorbed > 0 {
            self.details.insert(
                candidate.cid().to_string(),
                ChainDetail::new(candidate.into_chain(), true),
            );
            return Categorization::Absorbed {
                categories: absorbed,
            };
        }
        if contained {
            return Categorization::AlreadyContained;
        }
        if self.uncategorized.contains(&candidate) {
            return Categorization::AlreadyPending;
        }

        tracing::debug!(group_key = %self.key, cid = %candidate.cid(), "Chain pending categorization");
        self.details.insert(
            candidate.cid().to_string(),
            ChainDetail::new(candidate.chain().clone(), false),
        );
        self.uncategorized.insert(candidate);
        Categorization::Pending
    }

    /// Writes one detail row per chain, then the group's relationship row.
    ///
    /// A store failure is logged with the group key and phase and returned;
    /// nothing is retried here.
    pub fn save(&self, store: &dyn ChainStore) -> Result<(), CategorizeError> {
        let details = self
            .details
            .iter()
            .map(|(cid, detail)| -> Result<ChainDetailRecord, CategorizeError> {
                Ok(ChainDetailRecord {
                    chain_id: cid.clone(),
                    group_key: self.key.clone(),
                    shape: detail.chain.to_bytes()?,
                    categorized: detail.categorized,
                })
            })
            .collect::<Result<Vec<_>, CategorizeError>>()?;

        let mut relationship = RelationshipRecord::new(self.key.clone());
        relationship.pending = self.pending_ids();
        for (key, category) in &self.categorized {
            relationship
                .categories
                .insert(key.clone(), category.to_bytes()?);
        }

        store.save_chain_details(&details).map_err(|source| {
            tracing::error!(group_key = %self.key, error = %source, "Failed to save chain details");
            CategorizeError::Persistence {
                key: self.key.clone(),
                phase: StorePhase::Detail,
                source,
            }
        })?;

        store.save_chain_relationship(&relationship).map_err(|source| {
            tracing::error!(group_key = %self.key, error = %source, "Failed to save chain relationship");
            CategorizeError::Persistence {
                key: self.key.clone(),
                phase: StorePhase::Relationship,
                source,
            }
        })?;

        tracing::info!(
            group_key = %self.key,
            details = details.len(),
            categories = self.categorized.len(),
            pending = self.uncategorized.len(),
            "Saved chain relationship"
        );
        Ok(())
    }

    fn corrupt(&self, record: &str, reason: String) -> CategorizeError {
        tracing::error!(group_key = %self.key, record, reason = %reason, "Corrupt stored chain record");
        CategorizeError::CorruptRecord {
            key: self.key.clone(),
            record: record.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainNode, ChainStatus, NodeStatus};
    use chainsight_core::LevelPath;
    use chainsight_store::{InMemoryChainStore, StoreError};

    fn node(level: &str, view_point: Option<&str>, status: NodeStatus) -> ChainNode {
        ChainNode {
            level: LevelPath::parse(level).unwrap(),
            view_point: view_point.map(str::to_string),
            status,
            ..Default::default()
        }
    }

    fn chain(nodes: &[(&str, Option<&str>, NodeStatus)]) -> ChainInfo {
        ChainInfo::new(
            "group-1",
            None,
            nodes.iter().map(|(l, v, s)| node(l, *v, *s)).collect(),
        )
    }

    fn complete() -> ChainInfo {
        chain(&[
            ("0", Some("/checkout"), NodeStatus::Normal),
            ("0.0", Some("Cart.load"), NodeStatus::Normal),
            ("0.1", Some("Payment.charge"), NodeStatus::Normal),
        ])
    }

    fn truncated() -> ChainInfo {
        chain(&[
            ("0", Some("/checkout"), NodeStatus::Normal),
            ("0.0", Some("Cart.load"), NodeStatus::Abnormal),
        ])
    }

    fn unrelated() -> ChainInfo {
        chain(&[
            ("0", Some("/checkout"), NodeStatus::Normal),
            ("0.3", Some("Audit.write"), NodeStatus::Abnormal),
        ])
    }

    struct FailingStore {
        fail_details: bool,
    }

    impl ChainStore for FailingStore {
        fn save_chain_details(&self, _: &[ChainDetailRecord]) -> Result<(), StoreError> {
            if self.fail_details {
                Err(StoreError::Lock)
            } else {
                Ok(())
            }
        }

        fn save_chain_relationship(&self, _: &RelationshipRecord) -> Result<(), StoreError> {
            Err(StoreError::Lock)
        }

        fn load_chain_relationship(&self, _: &str) -> Result<Option<RelationshipRecord>, StoreError> {
            Err(StoreError::Lock)
        }

        fn load_chain_details(&self, _: &[String]) -> Result<Vec<ChainDetailRecord>, StoreError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_normal_chain_creates_category() {
        let mut relationship = ChainRelationship::new("group-1");
        let outcome = relationship.categorize(complete());

        assert_eq!(outcome, Categorization::NewCategory { reconciled: 0 });
        assert_eq!(relationship.categories().len(), 1);
        let category = relationship.category(&complete().cid).unwrap();
        assert_eq!(category.members().len(), 1);
        assert!(relationship.pending_ids().is_empty());
        assert!(relationship.detail(&complete().cid).unwrap().categorized);
    }

    #[test]
    fn test_normal_chain_resubmitted() {
        let mut relationship = ChainRelationship::new("group-1");
        relationship.categorize(complete());
        let outcome = relationship.categorize(complete());

        assert_eq!(outcome, Categorization::ExistingCategory { reconciled: 0 });
        assert_eq!(relationship.categories().len(), 1);
        assert_eq!(relationship.details().len(), 1);
    }

    #[test]
    fn test_abnormal_chain_absorbed_once() {
        let mut relationship = ChainRelationship::new("group-1");
        relationship.categorize(complete());

        assert_eq!(
            relationship.categorize(truncated()),
            Categorization::Absorbed { categories: 1 }
        );
        assert_eq!(relationship.categorize(truncated()), Categorization::AlreadyContained);

        let category = relationship.category(&complete().cid).unwrap();
        assert_eq!(category.members().len(), 2);
        assert!(!relationship.is_pending(&truncated().cid));
        assert!(relationship.detail(&truncated().cid).unwrap().categorized);
    }

    #[test]
    fn test_abnormal_chain_without_category_is_pending() {
        let mut relationship = ChainRelationship::new("group-1");
        assert_eq!(relationship.categorize(truncated()), Categorization::Pending);
        assert_eq!(relationship.categorize(truncated()), Categorization::AlreadyPending);

        assert_eq!(relationship.pending_ids().len(), 1);
        assert!(!relationship.detail(&truncated().cid).unwrap().categorized);
    }

    #[test]
    fn test_reconciliation_is_order_independent() {
        let mut late = ChainRelationship::new("group-1");
        late.categorize(truncated());
        late.categorize(unrelated());
        assert_eq!(
            late.categorize(complete()),
            Categorization::NewCategory { reconciled: 1 }
        );

        let mut early = ChainRelationship::new("group-1");
        early.categorize(complete());
        early.categorize(truncated());
        early.categorize(unrelated());

        assert_eq!(late.categories(), early.categories());
        assert_eq!(late.pending_ids(), early.pending_ids());
        assert_eq!(late.details(), early.details());
        assert!(late.is_pending(&unrelated().cid));
    }

    #[test]
    fn test_abnormal_chain_joins_every_containing_category() {
        let other = chain(&[
            ("0", Some("/checkout"), NodeStatus::Normal),
            ("0.0", Some("Cart.load"), NodeStatus::Normal),
            ("0.1", Some("Payment.refund"), NodeStatus::Normal),
        ]);
        let mut relationship = ChainRelationship::new("group-1");
        relationship.categorize(complete());
        relationship.categorize(other.clone());

        assert_eq!(
            relationship.categorize(truncated()),
            Categorization::Absorbed { categories: 2 }
        );
        assert!(relationship.category(&other.cid).unwrap().members().contains(&truncated().cid));
    }

    #[test]
    fn test_save_and_restore() {
        let store = InMemoryChainStore::new();
        let mut first = ChainRelationship::new("group-1");
        first.categorize(truncated());
        first.categorize(unrelated());
        first.save(&store).unwrap();
        assert_eq!(store.detail_count(), 2);

        let mut second = ChainRelationship::restore("group-1", &store).unwrap();
        assert_eq!(second.pending_ids().len(), 2);
        assert!(second.categories().is_empty());

        second.categorize(complete());
        assert!(!second.is_pending(&truncated().cid));
        second.save(&store).unwrap();
        assert!(store.detail(&truncated().cid).unwrap().categorized);
        assert!(!store.detail(&unrelated().cid).unwrap().categorized);

        let third = ChainRelationship::restore("group-1", &store).unwrap();
        assert_eq!(third.categories().len(), 1);
        assert_eq!(third.pending_ids(), BTreeSet::from([unrelated().cid]));
        let category = third.category(&complete().cid).unwrap();
        assert!(category.members().contains(&truncated().cid));
        assert_eq!(category.representative().status, ChainStatus::Normal);
    }

    #[test]
    fn test_restore_unknown_group_is_empty() {
        let store = InMemoryChainStore::new();
        let relationship = ChainRelationship::restore("nothing-here", &store).unwrap();
        assert!(relationship.categories().is_empty());
        assert!(relationship.pending_ids().is_empty());
    }

    #[test]
    fn test_restore_reports_corrupt_category() {
        let store = InMemoryChainStore::new();
        let mut record = RelationshipRecord::new("group-1");
        record.categories.insert("k1".to_string(), b"{not json".to_vec());
        store.save_chain_relationship(&record).unwrap();

        let err = ChainRelationship::restore("group-1", &store).unwrap_err();
        assert!(matches!(err, CategorizeError::CorruptRecord { record, .. } if record == "k1"));
    }

    #[test]
    fn test_restore_reports_pending_without_detail() {
        let store = InMemoryChainStore::new();
        let mut record = RelationshipRecord::new("group-1");
        record.pending.insert("ghost".to_string());
        store.save_chain_relationship(&record).unwrap();

        let err = ChainRelationship::restore("group-1", &store).unwrap_err();
        assert!(matches!(err, CategorizeError::CorruptRecord { record, .. } if record == "ghost"));
    }

    #[test]
    fn test_save_failures_carry_phase() {
        let mut relationship = ChainRelationship::new("group-1");
        relationship.categorize(complete());

        let err = relationship
            .save(&FailingStore { fail_details: true })
            .unwrap_err();
        assert!(matches!(
            err,
            CategorizeError::Persistence { phase: StorePhase::Detail, ref key, .. } if key == "group-1"
        ));

        let err = relationship
            .save(&FailingStore { fail_details: false })
            .unwrap_err();
        assert!(matches!(
            err,
            CategorizeError::Persistence { phase: StorePhase::Relationship, .. }
        ));

        let err = ChainRelationship::restore("group-1", &FailingStore { fail_details: false }).unwrap_err();
        assert!(matches!(err, CategorizeError::Persistence { .. }));
    }

    #[test]
    fn test_checkout_trace_with_gap_founds_category() {
        use chainsight_core::Span;
        use chainsight_tree::TraceSpanTree;

        let (cid, tree) = TraceSpanTree::build(vec![
            Span::new("t1", "", 0, "/checkout"),
            Span::new("t1", "0", 1, "PaymentService.charge"),
            Span::new("t1", "", 1, "/checkout/next"),
        ])
        .unwrap();
        let chain = ChainInfo::from_tree(&tree);
        assert_eq!(chain.status, ChainStatus::Normal);
        assert_eq!(chain.nodes[1].status, NodeStatus::Missing);

        let mut relationship = ChainRelationship::new(cid);
        let outcome = relationship.categorize(chain.clone());

        assert_eq!(outcome, Categorization::NewCategory { reconciled: 0 });
        assert_eq!(relationship.categories().len(), 1);
        let category = relationship.category(&chain.cid).unwrap();
        assert_eq!(category.members().len(), 1);
        assert!(relationship.pending_ids().is_empty());
        assert!(relationship.detail(&chain.cid).unwrap().categorized);
    }
}
