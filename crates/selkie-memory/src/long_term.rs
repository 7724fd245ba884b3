//! Long-term memory store
//!
//! TigerStyle: Invariants enforced at the facade, not trusted to callers.
//!
//! A thin facade over the vector store that owns the content hash and the
//! record lifecycle rules:
//!
//! - `create` computes the hash and short-circuits on exact dedup
//! - identity fields never change once `persisted_at` is set
//! - `supersede` refuses cycles by walking the existing chain
//! - `touch` batches access bumps
//!
//! Superseded records stay readable by id but never surface in search.

use std::sync::Arc;

use tracing::debug;

use selkie_core::{
    EnrichmentPatch, Error, MemoryId, MemoryIdGenerator, MemoryRecord, Result, TimeProvider,
    SUPERSEDE_CHAIN_DEPTH_MAX,
};
use selkie_store::{Filters, SearchPage, VectorQuery, VectorStore};

use crate::hash::record_hash;

/// Facade over the vector store enforcing long-term memory invariants
pub struct LongTermMemoryStore {
    store: Arc<dyn VectorStore>,
    ids: MemoryIdGenerator,
    time: Arc<dyn TimeProvider>,
}

impl LongTermMemoryStore {
    /// Create the facade
    pub fn new(store: Arc<dyn VectorStore>, time: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            ids: MemoryIdGenerator::new(),
            time,
        }
    }

    /// The underlying vector store
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Allocate a fresh record id
    pub fn next_id(&self) -> MemoryId {
        self.ids.next()
    }

    /// Create a long-term record
    ///
    /// Computes the hash, then takes the exact-dedup fast path: when a
    /// non-superseded record with the same hash already exists, that record
    /// is returned and nothing is written. Otherwise the record persists
    /// with `persisted_at = now` and empty enrichment fields.
    pub async fn create(&self, mut record: MemoryRecord) -> Result<MemoryRecord> {
        record.hash = record_hash(&record);

        // Exact-dedup fast path.
        if let Some(existing) = self.find_by_hash(&record.hash).await? {
            debug!(id = %existing.id, "Exact dedup hit; returning existing record");
            return Ok(existing);
        }

        // Re-creating an already persisted id must not alter identity fields.
        if let Some(existing) = self.store.get(record.id).await? {
            if existing.is_persisted() {
                if existing.hash == record.hash {
                    return Ok(existing);
                }
                return Err(Error::conflict(
                    record.id.to_string(),
                    "record id exists with different content",
                ));
            }
        }

        let now = self.time.now_ms();
        record.persisted_at = Some(now);
        record.vector = None;
        record.superseded_by = None;

        self.store.put(record.clone()).await?;
        Ok(record)
    }

    /// Fetch a record by id; superseded records remain readable
    pub async fn get(&self, id: MemoryId) -> Result<Option<MemoryRecord>> {
        self.store.get(id).await
    }

    /// Look up the visible record with the given hash, if any
    pub async fn find_by_hash(&self, hash: &str) -> Result<Option<MemoryRecord>> {
        let filters = Filters {
            hash: Some(hash.to_string()),
            ..Default::default()
        };
        let page = self.store.search(VectorQuery::scan(filters, 1)).await?;
        Ok(page.hits.into_iter().next().map(|hit| hit.record))
    }

    /// Update enrichment-owned fields
    ///
    /// Returns `true` when stored state changed. Identity fields cannot be
    /// patched; the patch type does not carry them.
    pub async fn update(&self, id: MemoryId, patch: EnrichmentPatch) -> Result<bool> {
        if patch.is_empty() {
            return Ok(false);
        }
        self.store.update_fields(id, patch).await
    }

    /// Mark `old_id` as superseded by `new_id` (idempotent)
    ///
    /// Refuses to create a cycle: if `old_id` is reachable from `new_id`
    /// through existing supersession links, the call fails with `Conflict`.
    pub async fn supersede(&self, old_id: MemoryId, new_id: MemoryId) -> Result<()> {
        if old_id == new_id {
            return Err(Error::conflict(
                old_id.to_string(),
                "record cannot supersede itself",
            ));
        }

        // Bounded walk from new_id; no recursion.
        let mut cursor = new_id;
        for _ in 0..SUPERSEDE_CHAIN_DEPTH_MAX {
            let Some(record) = self.store.get(cursor).await? else {
                break;
            };
            match record.superseded_by {
                Some(next) if next == old_id => {
                    return Err(Error::conflict(
                        old_id.to_string(),
                        "supersession would create a cycle",
                    ));
                }
                Some(next) => cursor = next,
                None => break,
            }
        }

        self.store
            .update_fields(old_id, EnrichmentPatch::supersede(new_id))
            .await?;
        Ok(())
    }

    /// Bump `last_accessed_at` and `access_count` for each id
    ///
    /// Missing ids are skipped; a touch must never fail a search.
    pub async fn touch(&self, ids: &[MemoryId]) -> Result<usize> {
        let now = self.time.now_ms();
        let mut touched = 0;
        for &id in ids {
            match self.store.update_fields(id, EnrichmentPatch::touch(now)).await {
                Ok(_) => touched += 1,
                Err(Error::NotFound { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(touched)
    }

    /// Delete records by id
    pub async fn delete(&self, ids: &[MemoryId]) -> Result<usize> {
        self.store.delete(ids).await
    }

    /// Count visible records matching the filters
    pub async fn count(&self, filters: Filters) -> Result<usize> {
        self.store.count(filters).await
    }

    /// Search visible records
    pub async fn search(&self, query: VectorQuery) -> Result<SearchPage> {
        self.store.search(query).await
    }
}
