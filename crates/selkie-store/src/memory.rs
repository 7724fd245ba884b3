//! In-memory vector store
//!
//! For testing and simulations. Implements the full adapter contract over a
//! process-local map: exact k-NN by cosine distance with filter pushdown,
//! field-granular enrichment updates applied under the same write lock that
//! search reads under, so updates are atomic relative to concurrent queries.

use std::collections::HashMap;

use tokio::sync::RwLock;

use selkie_core::{EnrichmentPatch, Error, MemoryId, MemoryRecord, Result};

use crate::adapter::{cosine_distance, SearchHit, SearchPage, VectorQuery, VectorStore};
use crate::filter::Filters;

/// In-memory reference backend
pub struct InMemoryVectorStore {
    /// Embedding dimension enforced on put and search
    dimensions: usize,
    /// Records by id
    records: RwLock<HashMap<MemoryId, MemoryRecord>>,
}

impl InMemoryVectorStore {
    /// Create a store enforcing the given embedding dimension
    pub fn new(dimensions: usize) -> Self {
        assert!(dimensions > 0, "dimensions must be positive");
        Self {
            dimensions,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// The enforced embedding dimension
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of stored records, hidden ones included
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True when no records are stored
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::SchemaError {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn is_visible(record: &MemoryRecord, include_hidden: bool) -> bool {
        include_hidden || record.is_searchable()
    }
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn put(&self, record: MemoryRecord) -> Result<()> {
        if let Some(ref vector) = record.vector {
            self.check_dimension(vector)?;
        }
        let mut records = self.records.write().await;
        records.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: MemoryId) -> Result<Option<MemoryRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&id).cloned())
    }

    async fn delete(&self, ids: &[MemoryId]) -> Result<usize> {
        let mut records = self.records.write().await;
        let mut removed = 0;
        for id in ids {
            if records.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn update_fields(&self, id: MemoryId, patch: EnrichmentPatch) -> Result<bool> {
        if let Some(ref vector) = patch.vector {
            self.check_dimension(vector)?;
        }
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("memory record", id.to_string()))?;
        Ok(patch.apply(record))
    }

    async fn search(&self, query: VectorQuery) -> Result<SearchPage> {
        query.filters.validate()?;
        if let Some(ref vector) = query.vector {
            self.check_dimension(vector)?;
        }

        let records = self.records.read().await;
        let mut hits: Vec<SearchHit> = Vec::new();

        for record in records.values() {
            if !Self::is_visible(record, query.include_hidden) {
                continue;
            }
            if !query.filters.matches(record) {
                continue;
            }

            let distance = match (&query.vector, &record.vector) {
                (Some(query_vec), Some(record_vec)) => cosine_distance(query_vec, record_vec),
                // Vectorless records are reachable by filter-only scans but
                // never rank in a semantic query.
                (Some(_), None) => continue,
                (None, _) => 0.0,
            };

            if let Some(threshold) = query.distance_threshold {
                if distance > threshold {
                    continue;
                }
            }

            hits.push(SearchHit {
                record: record.clone(),
                distance,
            });
        }

        if query.vector.is_some() {
            hits.sort_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        } else {
            // Deterministic order for scans: newest first.
            hits.sort_by(|a, b| b.record.id.cmp(&a.record.id));
        }

        let total = hits.len();
        let candidates = query.candidates_needed();
        hits.truncate(candidates);

        let page: Vec<SearchHit> = hits.into_iter().skip(query.offset).take(query.limit).collect();
        let consumed = query.offset + page.len();
        let next_offset = if consumed < total { Some(consumed) } else { None };

        Ok(SearchPage {
            total,
            hits: page,
            next_offset,
        })
    }

    async fn count(&self, filters: Filters) -> Result<usize> {
        filters.validate()?;
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.is_searchable() && filters.matches(r))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_core::{MemoryIdGenerator, MemoryType};

    fn persisted(
        gen: &MemoryIdGenerator,
        text: &str,
        user: &str,
        vector: Option<Vec<f32>>,
    ) -> MemoryRecord {
        let mut rec = MemoryRecord::new(gen.next(), text, MemoryType::Semantic, 1000)
            .unwrap()
            .with_user_id(user);
        rec.persisted_at = Some(1000);
        rec.vector = vector;
        rec
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryVectorStore::new(3);
        let gen = MemoryIdGenerator::new();
        let rec = persisted(&gen, "hello", "u1", Some(vec![1.0, 0.0, 0.0]));
        let id = rec.id;

        store.put(rec).await.unwrap();
        assert!(store.get(id).await.unwrap().is_some());

        let removed = store.delete(&[id]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = InMemoryVectorStore::new(3);
        let gen = MemoryIdGenerator::new();
        let rec = persisted(&gen, "hello", "u1", Some(vec![1.0, 0.0, 0.0]));

        store.put(rec.clone()).await.unwrap();
        store.put(rec.clone()).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = InMemoryVectorStore::new(3);
        let gen = MemoryIdGenerator::new();
        let rec = persisted(&gen, "hello", "u1", Some(vec![1.0, 0.0]));

        let err = store.put(rec).await.unwrap_err();
        assert!(matches!(err, Error::SchemaError { expected: 3, actual: 2 }));
    }

    #[tokio::test]
    async fn test_update_fields_unknown_id() {
        let store = InMemoryVectorStore::new(3);
        let gen = MemoryIdGenerator::new();
        let err = store
            .update_fields(gen.next(), EnrichmentPatch::touch(2000))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_search_orders_by_distance() {
        let store = InMemoryVectorStore::new(2);
        let gen = MemoryIdGenerator::new();

        let close = persisted(&gen, "close", "u1", Some(vec![1.0, 0.05]));
        let far = persisted(&gen, "far", "u1", Some(vec![0.0, 1.0]));
        let close_id = close.id;

        store.put(far).await.unwrap();
        store.put(close).await.unwrap();

        let page = store
            .search(VectorQuery::semantic(vec![1.0, 0.0], 10))
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.hits[0].record.id, close_id);
        assert!(page.hits[0].distance < page.hits[1].distance);
    }

    #[tokio::test]
    async fn test_search_excludes_hidden_records() {
        let store = InMemoryVectorStore::new(2);
        let gen = MemoryIdGenerator::new();

        let mut staged = persisted(&gen, "staged", "u1", Some(vec![1.0, 0.0]));
        staged.persisted_at = None;

        let mut superseded = persisted(&gen, "old", "u1", Some(vec![1.0, 0.0]));
        superseded.superseded_by = Some(gen.next());

        let visible = persisted(&gen, "visible", "u1", Some(vec![1.0, 0.0]));
        let visible_id = visible.id;

        store.put(staged).await.unwrap();
        store.put(superseded).await.unwrap();
        store.put(visible).await.unwrap();

        let page = store
            .search(VectorQuery::semantic(vec![1.0, 0.0], 10))
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.hits[0].record.id, visible_id);
    }

    #[tokio::test]
    async fn test_include_hidden_reaches_superseded() {
        let store = InMemoryVectorStore::new(2);
        let gen = MemoryIdGenerator::new();

        let mut superseded = persisted(&gen, "old", "u1", Some(vec![1.0, 0.0]));
        superseded.superseded_by = Some(gen.next());
        store.put(superseded).await.unwrap();

        let mut query = VectorQuery::semantic(vec![1.0, 0.0], 10);
        query.include_hidden = true;
        let page = store.search(query).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_filter_pushdown() {
        let store = InMemoryVectorStore::new(2);
        let gen = MemoryIdGenerator::new();

        store
            .put(persisted(&gen, "a", "u1", Some(vec![1.0, 0.0])))
            .await
            .unwrap();
        store
            .put(persisted(&gen, "b", "u2", Some(vec![1.0, 0.0])))
            .await
            .unwrap();

        let query =
            VectorQuery::semantic(vec![1.0, 0.0], 10).with_filters(Filters::for_user("u1"));
        let page = store.search(query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.hits[0].record.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_distance_threshold() {
        let store = InMemoryVectorStore::new(2);
        let gen = MemoryIdGenerator::new();

        store
            .put(persisted(&gen, "close", "u1", Some(vec![1.0, 0.0])))
            .await
            .unwrap();
        store
            .put(persisted(&gen, "far", "u1", Some(vec![0.0, 1.0])))
            .await
            .unwrap();

        let query = VectorQuery::semantic(vec![1.0, 0.0], 10).with_distance_threshold(0.1);
        let page = store.search(query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.hits[0].record.text, "close");
    }

    #[tokio::test]
    async fn test_vectorless_records_reachable_by_scan_only() {
        let store = InMemoryVectorStore::new(2);
        let gen = MemoryIdGenerator::new();

        store.put(persisted(&gen, "no-vec", "u1", None)).await.unwrap();

        let semantic = store
            .search(VectorQuery::semantic(vec![1.0, 0.0], 10))
            .await
            .unwrap();
        assert_eq!(semantic.total, 0);

        let scan = store
            .search(VectorQuery::scan(Filters::for_user("u1"), 10))
            .await
            .unwrap();
        assert_eq!(scan.total, 1);
    }

    #[tokio::test]
    async fn test_pagination() {
        let store = InMemoryVectorStore::new(2);
        let gen = MemoryIdGenerator::new();

        for i in 0..5 {
            store
                .put(persisted(&gen, &format!("rec-{}", i), "u1", Some(vec![1.0, 0.0])))
                .await
                .unwrap();
        }

        let page1 = store
            .search(VectorQuery::semantic(vec![1.0, 0.0], 2))
            .await
            .unwrap();
        assert_eq!(page1.total, 5);
        assert_eq!(page1.hits.len(), 2);
        assert_eq!(page1.next_offset, Some(2));

        let page3 = store
            .search(VectorQuery::semantic(vec![1.0, 0.0], 2).with_offset(4))
            .await
            .unwrap();
        assert_eq!(page3.hits.len(), 1);
        assert_eq!(page3.next_offset, None);
    }

    #[tokio::test]
    async fn test_count_respects_visibility() {
        let store = InMemoryVectorStore::new(2);
        let gen = MemoryIdGenerator::new();

        let mut hidden = persisted(&gen, "hidden", "u1", None);
        hidden.superseded_by = Some(gen.next());
        store.put(hidden).await.unwrap();
        store.put(persisted(&gen, "seen", "u1", None)).await.unwrap();

        assert_eq!(store.count(Filters::for_user("u1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_fields_visible_to_subsequent_search() {
        let store = InMemoryVectorStore::new(2);
        let gen = MemoryIdGenerator::new();

        let rec = persisted(&gen, "rec", "u1", None);
        let id = rec.id;
        store.put(rec).await.unwrap();

        let changed = store
            .update_fields(id, EnrichmentPatch::vector(vec![1.0, 0.0]))
            .await
            .unwrap();
        assert!(changed);

        let page = store
            .search(VectorQuery::semantic(vec![1.0, 0.0], 10))
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        // Same patch again is a no-op.
        let changed = store
            .update_fields(id, EnrichmentPatch::vector(vec![1.0, 0.0]))
            .await
            .unwrap();
        assert!(!changed);
    }
}
