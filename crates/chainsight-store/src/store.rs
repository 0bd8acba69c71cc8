//! SQLite-backed chain storage.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::record::{ChainDetailRecord, RelationshipRecord};
use crate::ChainStore;

/// Errors from chain store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Lock error")]
    Lock,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// SQLite-backed chain storage.
pub struct SqliteChainStore {
    conn: Mutex<Connection>,
}

impl SqliteChainStore {
    /// Opens (or creates) a store at the given database path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        tracing::info!("Chain store initialized at {}", path.display());
        Ok(store)
    }

    /// Creates an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chain_details (
                chain_id TEXT PRIMARY KEY,
                group_key TEXT NOT NULL,
                shape BLOB NOT NULL,
                categorized INTEGER NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS chain_relationships (
                group_key TEXT PRIMARY KEY,
                pending TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS chain_categories (
                group_key TEXT NOT NULL,
                category_key TEXT NOT NULL,
                shape BLOB NOT NULL,
                PRIMARY KEY (group_key, category_key)
            );

            CREATE INDEX IF NOT EXISTS idx_chain_details_group ON chain_details(group_key);
            "#,
        )?;

        Ok(())
    }

    /// Number of stored chain detail rows for a group.
    pub fn count_chain_details(&self, group_key: &str) -> Result<u64, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM chain_details WHERE group_key = ?1",
            params![group_key],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl ChainStore for SqliteChainStore {
    fn save_chain_details(&self, records: &[ChainDetailRecord]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT OR REPLACE INTO chain_details
                   (chain_id, group_key, shape, categorized, updated_at)
                   VALUES (?1, ?2, ?3, ?4, datetime('now'))"#,
            )?;
            for record in records {
                stmt.execute(params![
                    record.chain_id,
                    record.group_key,
                    record.shape,
                    record.categorized,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(rows = records.len(), "Saved chain details");
        Ok(())
    }

    fn save_chain_relationship(&self, record: &RelationshipRecord) -> Result<(), StoreError> {
        let pending = serde_json::to_string(&record.pending)?;

        let mut conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"INSERT OR REPLACE INTO chain_relationships (group_key, pending, updated_at)
               VALUES (?1, ?2, datetime('now'))"#,
            params![record.group_key, pending],
        )?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT OR REPLACE INTO chain_categories (group_key, category_key, shape)
                   VALUES (?1, ?2, ?3)"#,
            )?;
            for (category_key, shape) in &record.categories {
                stmt.execute(params![record.group_key, category_key, shape])?;
            }
        }
        tx.commit()?;

        tracing::debug!(
            group_key = %record.group_key,
            pending = record.pending.len(),
            categories = record.categories.len(),
            "Saved chain relationship"
        );
        Ok(())
    }

    fn load_chain_relationship(
        &self,
        group_key: &str,
    ) -> Result<Option<RelationshipRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let pending: Option<String> = conn
            .query_row(
                "SELECT pending FROM chain_relationships WHERE group_key = ?1",
                params![group_key],
                |row| row.get(0),
            )
            .optional()?;
        let Some(pending) = pending else {
            return Ok(None);
        };

        let mut record = RelationshipRecord::new(group_key);
        record.pending = serde_json::from_str::<BTreeSet<String>>(&pending)?;

        let mut stmt = conn.prepare(
            "SELECT category_key, shape FROM chain_categories WHERE group_key = ?1",
        )?;
        let rows = stmt.query_map(params![group_key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;
        for row in rows {
            let (category_key, shape) = row?;
            record.categories.insert(category_key, shape);
        }

        Ok(Some(record))
    }

    fn load_chain_details(&self, chain_ids: &[String]) -> Result<Vec<ChainDetailRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let mut stmt = conn.prepare(
            r#"SELECT chain_id, group_key, shape, categorized
               FROM chain_details WHERE chain_id = ?1"#,
        )?;

        let mut details = Vec::with_capacity(chain_ids.len());
        for chain_id in chain_ids {
            let detail = stmt
                .query_row(params![chain_id], |row| {
                    Ok(ChainDetailRecord {
                        chain_id: row.get(0)?,
                        group_key: row.get(1)?,
                        shape: row.get(2)?,
                        categorized: row.get(3)?,
                    })
                })
                .optional()?;
            details.extend(detail);
        }

        Ok(details)
    }
}
