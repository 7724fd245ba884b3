//! Vector store contract
//!
//! TigerStyle: Explicit operations, atomic transitions, no silent drops.
//!
//! Backends guarantee:
//! - `put` is idempotent on `id`
//! - `update_fields` merges at field granularity (last writer wins per field)
//! - vector and filter-field updates are atomic relative to concurrent `search`
//!
//! Failure mapping: backend unreachable → `StoreUnavailable`; embedding
//! dimension mismatch → `SchemaError`; unknown id on update → `NotFound`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use selkie_core::{
    EnrichmentPatch, MemoryId, MemoryRecord, Result, SEARCH_CANDIDATES_COUNT_MAX,
};

use crate::filter::Filters;

/// Query against the long-term record index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorQuery {
    /// Query embedding; `None` selects a filter-only scan
    pub vector: Option<Vec<f32>>,
    /// Filter expression, pushed down by the backend
    #[serde(default)]
    pub filters: Filters,
    /// Maximum hits returned
    pub limit: usize,
    /// Hits skipped before the page starts
    #[serde(default)]
    pub offset: usize,
    /// Drop hits with cosine distance above this value
    #[serde(default)]
    pub distance_threshold: Option<f64>,
    /// Include records that are superseded or not yet persisted
    ///
    /// Off for client search (the invariant); on for internal maintenance
    /// scans such as compaction.
    #[serde(default)]
    pub include_hidden: bool,
}

impl VectorQuery {
    /// Vector search with the given embedding
    pub fn semantic(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector: Some(vector),
            limit,
            ..Default::default()
        }
    }

    /// Filter-only scan
    pub fn scan(filters: Filters, limit: usize) -> Self {
        Self {
            filters,
            limit,
            ..Default::default()
        }
    }

    /// Attach filters
    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Attach a distance threshold
    pub fn with_distance_threshold(mut self, threshold: f64) -> Self {
        self.distance_threshold = Some(threshold);
        self
    }

    /// Attach an offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Total candidates the backend must materialize for this query
    pub fn candidates_needed(&self) -> usize {
        (self.limit + self.offset).min(SEARCH_CANDIDATES_COUNT_MAX)
    }
}

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matching record
    pub record: MemoryRecord,
    /// Cosine distance to the query vector; 0.0 for filter-only scans
    pub distance: f64,
}

impl SearchHit {
    /// Similarity score derived from the distance
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

/// One page of search results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPage {
    /// Total matches before pagination
    pub total: usize,
    /// Hits in this page, ordered by ascending distance
    pub hits: Vec<SearchHit>,
    /// Offset of the next page, absent when exhausted
    pub next_offset: Option<usize>,
}

/// Backend-agnostic vector store for long-term memory records
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert a record with full metadata and optional vector
    ///
    /// Idempotent on `id`: re-putting the same record is a no-op.
    async fn put(&self, record: MemoryRecord) -> Result<()>;

    /// Fetch a record by primary id
    async fn get(&self, id: MemoryId) -> Result<Option<MemoryRecord>>;

    /// Remove records by primary id (bulk); missing ids are ignored
    async fn delete(&self, ids: &[MemoryId]) -> Result<usize>;

    /// Partial update restricted to enrichment-owned fields
    ///
    /// Returns `true` when the patch changed stored state.
    ///
    /// # Errors
    /// Returns `NotFound` when the id is unknown.
    async fn update_fields(&self, id: MemoryId, patch: EnrichmentPatch) -> Result<bool>;

    /// Execute a vector or filter-only search
    ///
    /// Unless `include_hidden` is set, records with `superseded_by` set or
    /// `persisted_at` unset never appear in the results.
    async fn search(&self, query: VectorQuery) -> Result<SearchPage>;

    /// Exact cardinality of a filter expression over visible records
    async fn count(&self, filters: Filters) -> Result<usize>;
}

/// Cosine distance between two equal-length vectors
///
/// Returns 1.0 (maximally distant) for zero-magnitude inputs.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        return 1.0;
    }
    (1.0 - dot / denominator).clamp(0.0, 2.0)
}
