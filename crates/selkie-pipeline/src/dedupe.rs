//! Deduplication
//!
//! TigerStyle: Two phases, explicit decisions, no destructive writes here.
//!
//! The exact phase drops candidates whose hash already exists as a visible
//! record. The semantic phase embeds the survivors, queries the top
//! neighbours scoped to the same user and namespace, and applies the
//! containment rule at or below the distance threshold:
//!
//! - candidate strictly contains the hit (token-set containment): the hit
//!   will be superseded by the candidate, candidate survives
//! - otherwise: the candidate drops and the hit gets an access touch
//!
//! This module only decides; the promotion orchestrator applies
//! supersessions after candidates are persisted, so `superseded_by` never
//! points at a record that failed to persist.

use std::collections::HashSet;

use tracing::debug;

use selkie_core::{
    MemoryId, MemoryRecord, RequestContext, Result, DEDUP_NEIGHBORS_COUNT,
};
use selkie_llm::EmbeddingProvider;
use selkie_memory::{record_hash, LongTermMemoryStore};
use selkie_store::{Filters, TagFilter, VectorQuery};

/// What dedup decided for one surviving candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupeDecision {
    /// No close neighbour; persist as-is
    Keep,
    /// Persist, then mark this existing record superseded by the candidate
    KeepAndSupersede(MemoryId),
}

/// One candidate that survived dedup, with its embedding
#[derive(Debug, Clone)]
pub struct SurvivingCandidate {
    pub record: MemoryRecord,
    pub vector: Vec<f32>,
    pub decision: DedupeDecision,
}

/// Result of a dedup pass
#[derive(Debug, Default)]
pub struct DedupeOutcome {
    /// Candidates to persist, with decisions
    pub kept: Vec<SurvivingCandidate>,
    /// Candidates dropped by the exact phase
    pub exact_dropped: usize,
    /// Candidates dropped by the semantic phase
    pub semantic_dropped: usize,
    /// Existing records to touch for dropped near-duplicates
    pub touched: Vec<MemoryId>,
}

/// Lowercased alphanumeric token set of a text
pub fn token_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when `candidate` strictly contains `existing` as a token set
pub fn strictly_contains(candidate: &str, existing: &str) -> bool {
    let candidate_tokens = token_set(candidate);
    let existing_tokens = token_set(existing);
    candidate_tokens.len() > existing_tokens.len()
        && existing_tokens.is_subset(&candidate_tokens)
}

/// Run both dedup phases over a candidate batch
pub async fn dedupe_batch(
    long_term: &LongTermMemoryStore,
    embeddings: &dyn EmbeddingProvider,
    candidates: Vec<MemoryRecord>,
    dedup_distance_threshold: f64,
    ctx: &RequestContext,
) -> Result<DedupeOutcome> {
    let mut outcome = DedupeOutcome::default();
    if candidates.is_empty() {
        return Ok(outcome);
    }
    ctx.check_deadline("dedupe_batch")?;

    // Exact phase: drop candidates whose hash is already visible.
    let mut exact_survivors = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let hash = record_hash(&candidate);
        if long_term.find_by_hash(&hash).await?.is_some() {
            outcome.exact_dropped += 1;
            continue;
        }
        exact_survivors.push(candidate);
    }
    if exact_survivors.is_empty() {
        return Ok(outcome);
    }

    // Semantic phase: embed survivors in one batch.
    let texts: Vec<&str> = exact_survivors.iter().map(|c| c.text.as_str()).collect();
    let vectors = embeddings.embed_batch(&texts).await?;
    debug_assert_eq!(vectors.len(), exact_survivors.len());

    for (candidate, vector) in exact_survivors.into_iter().zip(vectors) {
        ctx.check_deadline("dedupe_batch")?;

        let mut filters = Filters::default();
        if let Some(ref user_id) = candidate.user_id {
            filters.user_id = Some(TagFilter::eq(user_id.clone()));
        }
        if let Some(ref namespace) = candidate.namespace {
            filters.namespace = Some(TagFilter::eq(namespace.clone()));
        }

        let query = VectorQuery::semantic(vector.clone(), DEDUP_NEIGHBORS_COUNT)
            .with_filters(filters)
            .with_distance_threshold(dedup_distance_threshold);
        let page = long_term.search(query).await?;

        let decision = match page.hits.first() {
            None => DedupeDecision::Keep,
            Some(top) => {
                if strictly_contains(&candidate.text, &top.record.text) {
                    debug!(
                        candidate = %candidate.id,
                        hit = %top.record.id,
                        distance = top.distance,
                        "Candidate contains near-duplicate; will supersede"
                    );
                    DedupeDecision::KeepAndSupersede(top.record.id)
                } else {
                    debug!(
                        candidate = %candidate.id,
                        hit = %top.record.id,
                        distance = top.distance,
                        "Candidate dropped as near-duplicate"
                    );
                    outcome.semantic_dropped += 1;
                    outcome.touched.push(top.record.id);
                    continue;
                }
            }
        };

        outcome.kept.push(SurvivingCandidate {
            record: candidate,
            vector,
            decision,
        });
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use selkie_core::{ManualClock, MemoryType};
    use selkie_llm::SimEmbeddingProvider;
    use selkie_store::InMemoryVectorStore;

    const DIM: usize = 8;

    fn setup() -> (LongTermMemoryStore, SimEmbeddingProvider) {
        let ltm = LongTermMemoryStore::new(
            Arc::new(InMemoryVectorStore::new(DIM)),
            Arc::new(ManualClock::new(1_000)),
        );
        (ltm, SimEmbeddingProvider::new(DIM))
    }

    fn candidate(ltm: &LongTermMemoryStore, text: &str) -> MemoryRecord {
        MemoryRecord::new(ltm.next_id(), text, MemoryType::Semantic, 500)
            .unwrap()
            .with_user_id("u1")
            .with_namespace("n1")
    }

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn test_token_set() {
        let tokens = token_set("The user likes hot, green tea!");
        assert!(tokens.contains("tea"));
        assert!(tokens.contains("green"));
        assert!(!tokens.contains(""));
    }

    #[test]
    fn test_strict_containment() {
        assert!(strictly_contains(
            "the user likes hot green tea in the morning",
            "user likes tea"
        ));
        // Equal sets are not strict.
        assert!(!strictly_contains("user likes tea", "tea likes user"));
        // Missing token breaks containment.
        assert!(!strictly_contains("user likes hot tea", "user likes coffee"));
    }

    #[tokio::test]
    async fn test_exact_phase_drops_known_hash() {
        let (ltm, embeddings) = setup();
        let ctx = RequestContext::new();

        ltm.create(candidate(&ltm, "user likes tea")).await.unwrap();

        let outcome = dedupe_batch(
            &ltm,
            &embeddings,
            vec![candidate(&ltm, "user likes tea")],
            0.1,
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(outcome.exact_dropped, 1);
        assert!(outcome.kept.is_empty());
    }

    #[tokio::test]
    async fn test_unrelated_candidates_keep() {
        let (ltm, embeddings) = setup();
        let ctx = RequestContext::new();

        // Orthogonal pinned vectors: far apart.
        embeddings.pin("user likes tea", unit(DIM, 0));
        embeddings.pin("meeting moved to friday", unit(DIM, 1));

        let existing = candidate(&ltm, "user likes tea");
        let existing = ltm.create(existing).await.unwrap();
        ltm.update(existing.id, selkie_core::EnrichmentPatch::vector(unit(DIM, 0)))
            .await
            .unwrap();

        let outcome = dedupe_batch(
            &ltm,
            &embeddings,
            vec![candidate(&ltm, "meeting moved to friday")],
            0.1,
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].decision, DedupeDecision::Keep);
    }

    #[tokio::test]
    async fn test_containment_supersedes_hit() {
        let (ltm, embeddings) = setup();
        let ctx = RequestContext::new();

        let shared = unit(DIM, 0);
        embeddings.pin("user likes tea", shared.clone());
        embeddings.pin("the user likes hot green tea in the morning", shared.clone());

        let existing = ltm.create(candidate(&ltm, "user likes tea")).await.unwrap();
        ltm.update(existing.id, selkie_core::EnrichmentPatch::vector(shared))
            .await
            .unwrap();

        let outcome = dedupe_batch(
            &ltm,
            &embeddings,
            vec![candidate(&ltm, "the user likes hot green tea in the morning")],
            0.1,
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(
            outcome.kept[0].decision,
            DedupeDecision::KeepAndSupersede(existing.id)
        );
        assert_eq!(outcome.semantic_dropped, 0);
    }

    #[tokio::test]
    async fn test_non_containment_drops_and_touches() {
        let (ltm, embeddings) = setup();
        let ctx = RequestContext::new();

        let shared = unit(DIM, 0);
        embeddings.pin("user likes tea", shared.clone());
        embeddings.pin("user enjoys tea", shared.clone());

        let existing = ltm.create(candidate(&ltm, "user likes tea")).await.unwrap();
        ltm.update(existing.id, selkie_core::EnrichmentPatch::vector(shared))
            .await
            .unwrap();

        let outcome = dedupe_batch(
            &ltm,
            &embeddings,
            // Same distance, but not a token superset.
            vec![candidate(&ltm, "user enjoys tea")],
            0.1,
            &ctx,
        )
        .await
        .unwrap();

        assert!(outcome.kept.is_empty());
        assert_eq!(outcome.semantic_dropped, 1);
        assert_eq!(outcome.touched, vec![existing.id]);
    }

    #[tokio::test]
    async fn test_dedup_scoped_to_user() {
        let (ltm, embeddings) = setup();
        let ctx = RequestContext::new();

        let shared = unit(DIM, 0);
        embeddings.pin("user likes tea", shared.clone());

        // Same text but a different user: invisible to this user's dedup.
        let other = MemoryRecord::new(ltm.next_id(), "user likes tea", MemoryType::Semantic, 0)
            .unwrap()
            .with_user_id("u2")
            .with_namespace("n1");
        let other = ltm.create(other).await.unwrap();
        ltm.update(other.id, selkie_core::EnrichmentPatch::vector(shared))
            .await
            .unwrap();

        let outcome = dedupe_batch(
            &ltm,
            &embeddings,
            vec![candidate(&ltm, "user likes tea")],
            0.1,
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].decision, DedupeDecision::Keep);
    }
}
