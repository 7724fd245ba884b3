//! Hybrid memory search
//!
//! TigerStyle: Filter pushdown, bounded candidates, async bookkeeping.
//!
//! Text queries embed server-side and run a filtered vector search; queries
//! without text degrade to a filter-only scan. Results may be re-ranked by
//! `alpha * similarity + beta * recency + gamma * log(1 + access_count)`;
//! the defaults select pure similarity. Access touches are scheduled on the
//! task runtime, never taken synchronously.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use selkie_core::{
    Error, MemoryConfig, MemoryRecord, RequestContext, Result, TimeProvider,
    SEARCH_CANDIDATES_COUNT_MAX, SEARCH_LIMIT_DEFAULT,
};
use selkie_llm::{EmbeddingProvider, GenerationProvider};
use selkie_memory::{LongTermMemoryStore, WorkingMemoryStore};
use selkie_pipeline::TOUCH_TASK;
use selkie_runtime::{TaskSink, TaskSpec};
use selkie_store::{Filters, VectorQuery};

const DAY_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Prompt used to rewrite a query into a vector-friendly form
const OPTIMIZE_QUERY_PROMPT: &str = "Rewrite the following search query into a short, \
keyword-dense form suited to embedding similarity search. Respond with the rewritten \
query only.\n\nQuery: {query}\n\nRewritten:";

/// A search request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Natural-language query; embedded on the server
    #[serde(default)]
    pub text: Option<String>,
    /// Structured filters
    #[serde(default)]
    pub filters: Filters,
    /// Drop hits with cosine distance above this value
    #[serde(default)]
    pub distance_threshold: Option<f64>,
    /// Page size
    #[serde(default)]
    pub limit: Option<usize>,
    /// Page start
    #[serde(default)]
    pub offset: usize,
    /// Rewrite the query with the fast model before embedding
    #[serde(default)]
    pub optimize_query: bool,
}

/// One search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matching record
    pub record: MemoryRecord,
    /// Cosine distance; 0.0 for filter-only queries
    pub distance: f64,
    /// Ranking score after re-weighting
    pub score: f64,
}

/// One page of search results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Total matches before pagination
    pub total: usize,
    /// Results in rank order
    pub memories: Vec<SearchResult>,
    /// Offset of the next page, absent when exhausted
    pub next_offset: Option<usize>,
}

/// Read-side service over the memory stores
pub struct QueryService {
    pub config: MemoryConfig,
    pub working: Arc<WorkingMemoryStore>,
    pub long_term: Arc<LongTermMemoryStore>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub generation: Arc<dyn GenerationProvider>,
    pub tasks: Arc<dyn TaskSink>,
    pub time: Arc<dyn TimeProvider>,
}

impl QueryService {
    /// Execute a search
    pub async fn search(&self, request: SearchRequest, ctx: &RequestContext) -> Result<SearchResponse> {
        if !self.config.store.long_term_memory_enabled {
            return Err(Error::input_invalid(
                "search",
                "long-term memory is disabled",
            ));
        }
        request.filters.validate()?;
        ctx.check_deadline("search")?;

        let limit = request.limit.unwrap_or(SEARCH_LIMIT_DEFAULT);
        if limit == 0 || limit > SEARCH_CANDIDATES_COUNT_MAX {
            return Err(Error::input_invalid(
                "limit",
                format!("must be in 1..={}", SEARCH_CANDIDATES_COUNT_MAX),
            ));
        }

        let vector = match request.text.as_deref() {
            Some(text) if !text.trim().is_empty() => {
                let query_text = if request.optimize_query {
                    // Synchronous request path: provider failures surface.
                    self.optimize_query(text).await?
                } else {
                    text.to_string()
                };
                Some(self.embeddings.embed(&query_text).await?)
            }
            _ => None,
        };

        let mut query = VectorQuery {
            vector,
            filters: request.filters,
            limit,
            offset: request.offset,
            distance_threshold: request.distance_threshold,
            include_hidden: false,
        };

        // Re-ranking needs the full candidate pool before pagination.
        let rerank = !self.config.rerank.is_similarity_only() && query.vector.is_some();
        if rerank {
            query.limit = query.candidates_needed();
            query.offset = 0;
        }

        let page = self.long_term.search(query).await?;

        let now = self.time.now_ms();
        let mut memories: Vec<SearchResult> = page
            .hits
            .into_iter()
            .map(|hit| {
                let score = self.score(hit.similarity(), &hit.record, now);
                SearchResult {
                    record: hit.record,
                    distance: hit.distance,
                    score,
                }
            })
            .collect();

        let (total, next_offset) = if rerank {
            memories.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let total = page.total;
            let paged: Vec<SearchResult> = memories
                .into_iter()
                .skip(request.offset)
                .take(limit)
                .collect();
            let consumed = request.offset + paged.len();
            memories = paged;
            (total, (consumed < total).then_some(consumed))
        } else {
            (page.total, page.next_offset)
        };

        self.schedule_touch(memories.iter().map(|m| m.record.id.to_string()).collect());

        debug!(
            total,
            returned = memories.len(),
            "Search complete"
        );
        Ok(SearchResponse {
            total,
            memories,
            next_offset,
        })
    }

    /// Rewrite a query with the fast model
    async fn optimize_query(&self, text: &str) -> Result<String> {
        let prompt = OPTIMIZE_QUERY_PROMPT.replace("{query}", text);
        let rewritten = self
            .generation
            .generate(&prompt, &self.config.embedding.generation_model_fast, 128)
            .await?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            Ok(text.to_string())
        } else {
            Ok(rewritten.to_string())
        }
    }

    fn score(&self, similarity: f64, record: &MemoryRecord, now_ms: u64) -> f64 {
        let weights = self.config.rerank;
        if weights.is_similarity_only() {
            return similarity;
        }

        let age_ms = now_ms.saturating_sub(record.last_accessed_at) as f64;
        let recency = 1.0 / (1.0 + age_ms / DAY_MS);
        let usage = (1.0 + record.access_count as f64).ln();

        weights.alpha * similarity + weights.beta * recency + weights.gamma * usage
    }

    /// Schedule a batched touch; never blocks the search path
    pub(crate) fn schedule_touch(&self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        let spec = TaskSpec::new(TOUCH_TASK, json!({ "ids": ids }));
        if let Err(err) = self.tasks.enqueue(spec) {
            // A full queue must not fail the read path.
            warn!(error = %err, "Touch enqueue failed");
        }
    }
}
