//! Persistence adapters for categorized call chains.

mod record;
mod store;

pub use record::{ChainDetailRecord, RelationshipRecord};
pub use store::{SqliteChainStore, StoreError};

use std::collections::HashMap;
use std::sync::Mutex;

/// Durable store for chain details and per-group relationships.
///
/// Writes are synchronous and form the only I/O boundary of a categorization
/// pass; callers own retry and timeout policy.
pub trait ChainStore: Send + Sync {
    /// Upserts one detail row per chain.
    fn save_chain_details(&self, records: &[ChainDetailRecord]) -> Result<(), StoreError>;
    /// Upserts the relationship row of a group.
    fn save_chain_relationship(&self, record: &RelationshipRecord) -> Result<(), StoreError>;
    /// Loads the relationship row of a group, if one was saved.
    fn load_chain_relationship(
        &self,
        group_key: &str,
    ) -> Result<Option<RelationshipRecord>, StoreError>;
    /// Loads the detail rows that exist for the given chain ids.
    fn load_chain_details(&self, chain_ids: &[String]) -> Result<Vec<ChainDetailRecord>, StoreError>;
}

/// In-memory chain store.
#[derive(Default)]
pub struct InMemoryChainStore {
    details: Mutex<HashMap<String, ChainDetailRecord>>,
    relationships: Mutex<HashMap<String, RelationshipRecord>>,
}

impl InMemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detail(&self, chain_id: &str) -> Option<ChainDetailRecord> {
        let Ok(guard) = self.details.lock() else {
            tracing::warn!("Failed to acquire chain details lock");
            return None;
        };
        guard.get(chain_id).cloned()
    }

    pub fn detail_count(&self) -> usize {
        self.details.lock().map(|g| g.len()).unwrap_or(0)
    }
}

impl ChainStore for InMemoryChainStore {
    fn save_chain_details(&self, records: &[ChainDetailRecord]) -> Result<(), StoreError> {
        let mut guard = self.details.lock().map_err(|_| StoreError::Lock)?;
        for record in records {
            guard.insert(record.chain_id.clone(), record.clone());
        }
        Ok(())
    }

    fn save_chain_relationship(&self, record: &RelationshipRecord) -> Result<(), StoreError> {
        let mut guard = self.relationships.lock().map_err(|_| StoreError::Lock)?;
        let entry = guard
            .entry(record.group_key.clone())
            .or_insert_with(|| RelationshipRecord::new(record.group_key.clone()));
        entry.pending = record.pending.clone();
        entry
            .categories
            .extend(record.categories.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn load_chain_relationship(
        &self,
        group_key: &str,
    ) -> Result<Option<RelationshipRecord>, StoreError> {
        let guard = self.relationships.lock().map_err(|_| StoreError::Lock)?;
        Ok(guard.get(group_key).cloned())
    }

    fn load_chain_details(&self, chain_ids: &[String]) -> Result<Vec<ChainDetailRecord>, StoreError> {
        let guard = self.details.lock().map_err(|_| StoreError::Lock)?;
        Ok(chain_ids
            .iter()
            .filter_map(|id| guard.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_store_matches_sqlite_upsert_semantics() {
        let store = InMemoryChainStore::new();

        let mut record = RelationshipRecord::new("g1");
        record.pending.insert("p1".to_string());
        record.categories.insert("k1".to_string(), b"a".to_vec());
        store.save_chain_relationship(&record).unwrap();

        let mut second = RelationshipRecord::new("g1");
        second.categories.insert("k2".to_string(), b"b".to_vec());
        store.save_chain_relationship(&second).unwrap();

        let loaded = store.load_chain_relationship("g1").unwrap().unwrap();
        assert!(loaded.pending.is_empty());
        assert_eq!(loaded.categories.len(), 2);
        assert!(store.load_chain_relationship("g2").unwrap().is_none());
    }

    #[test]
    fn test_in_memory_details() {
        let store = InMemoryChainStore::new();
        store
            .save_chain_details(&[ChainDetailRecord {
                chain_id: "c1".to_string(),
                group_key: "g1".to_string(),
                shape: vec![1, 2, 3],
                categorized: false,
            }])
            .unwrap();

        assert_eq!(store.detail_count(), 1);
        assert!(!store.detail("c1").unwrap().categorized);
        let loaded = store
            .load_chain_details(&["c1".to_string(), "c2".to_string()])
            .unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
