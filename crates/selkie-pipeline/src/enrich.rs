//! Enrichment stages
//!
//! TigerStyle: Every write goes through guarded field updates.
//!
//! Embedding, topic tagging, and entity extraction each write one
//! enrichment-owned field via `update_fields` with
//! write-if-absent-or-changed semantics, so re-running a stage is a no-op.
//! A record whose embedding keeps failing is flagged `enrichment_failed`
//! and retained; it stays reachable through filter-only scans.

use std::collections::HashMap;

use tracing::{debug, warn};

use selkie_core::{
    EnrichmentPatch, Error, ExtractionConfig, MemoryId, MemoryRecord, RequestContext, Result,
    TimeProvider, TopicModelSource,
};
use selkie_llm::{retry_with_backoff, EmbeddingProvider, GenerationProvider, RetryPolicy};
use selkie_memory::LongTermMemoryStore;

use std::sync::Arc;

/// Attach vectors to persisted records
///
/// `precomputed` carries embeddings already produced during dedup; anything
/// missing is embedded in one batch. Provider failures retry with backoff;
/// records that still fail are flagged poisoned and kept.
pub async fn embed_records(
    long_term: &LongTermMemoryStore,
    embeddings: &dyn EmbeddingProvider,
    records: &[MemoryRecord],
    precomputed: &HashMap<MemoryId, Vec<f32>>,
    retry: RetryPolicy,
    time: &Arc<dyn TimeProvider>,
    ctx: &RequestContext,
) -> Result<usize> {
    ctx.check_deadline("embed_records")?;

    let missing: Vec<&MemoryRecord> = records
        .iter()
        .filter(|r| r.vector.is_none() && !precomputed.contains_key(&r.id))
        .collect();

    let mut fresh: HashMap<MemoryId, Vec<f32>> = HashMap::new();
    if !missing.is_empty() {
        let texts: Vec<&str> = missing.iter().map(|r| r.text.as_str()).collect();
        let batch = retry_with_backoff(retry, time, "embed_batch", || async {
            embeddings.embed_batch(&texts).await
        })
        .await;

        match batch {
            Ok(vectors) => {
                for (record, vector) in missing.iter().zip(vectors) {
                    fresh.insert(record.id, vector);
                }
            }
            Err(err) => {
                // Poisoned: flag each record, keep it, surface nothing.
                warn!(error = %err, count = missing.len(), "Embedding failed; flagging records");
                for record in &missing {
                    long_term
                        .update(
                            record.id,
                            EnrichmentPatch {
                                enrichment_failed: Some(true),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
            }
        }
    }

    let mut embedded = 0;
    for record in records {
        let vector = precomputed
            .get(&record.id)
            .or_else(|| fresh.get(&record.id));
        let Some(vector) = vector else {
            continue;
        };
        if long_term
            .update(record.id, EnrichmentPatch::vector(vector.clone()))
            .await?
        {
            embedded += 1;
        }
    }

    Ok(embedded)
}

/// Attach topics to a record
///
/// Source `llm` classifies with the generation provider; `local` runs the
/// in-process keyword model. When a taxonomy is configured, produced labels
/// are whitelisted against it either way.
pub async fn tag_topics(
    long_term: &LongTermMemoryStore,
    generation: &dyn GenerationProvider,
    config: &ExtractionConfig,
    record: &MemoryRecord,
    ctx: &RequestContext,
) -> Result<bool> {
    if !config.enable_topic_extraction {
        return Ok(false);
    }
    ctx.check_deadline("tag_topics")?;

    let mut topics = match config.topic_model_source {
        TopicModelSource::Llm => {
            generation
                .classify(&record.text, &config.topic_taxonomy, config.top_k_topics)
                .await?
        }
        TopicModelSource::Local => local_topics(&record.text, config.top_k_topics),
    };

    if !config.topic_taxonomy.is_empty() {
        topics.retain(|t| config.topic_taxonomy.contains(t));
    }
    topics.truncate(config.top_k_topics);

    if topics.is_empty() {
        return Ok(false);
    }
    debug!(id = %record.id, ?topics, "Topics tagged");
    long_term
        .update(record.id, EnrichmentPatch::topics(topics))
        .await
}

/// Attach entities to a record
pub async fn extract_entities(
    long_term: &LongTermMemoryStore,
    config: &ExtractionConfig,
    record: &MemoryRecord,
    ctx: &RequestContext,
) -> Result<bool> {
    if !config.enable_ner {
        return Ok(false);
    }
    ctx.check_deadline("extract_entities")?;

    let entities = named_entities(&record.text);
    if entities.is_empty() {
        return Ok(false);
    }
    long_term
        .update(record.id, EnrichmentPatch::entities(entities))
        .await
}

/// Local topic model: most frequent non-trivial words
///
/// Deterministic and provider-free; the fallback when `topic_model_source`
/// is `local`.
pub fn local_topics(text: &str, top_k: usize) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "the", "and", "for", "with", "that", "this", "from", "user", "about", "their", "have",
        "has", "was", "were", "are", "will", "its", "his", "her", "they", "them",
    ];

    let lower = text.to_lowercase();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for word in lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(w))
    {
        match counts.iter_mut().find(|(w, _)| w == word) {
            Some((_, count)) => *count += 1,
            None => counts.push((word.to_string(), 1)),
        }
    }

    // Stable order: by descending count, then first appearance.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().take(top_k).map(|(w, _)| w).collect()
}

/// Heuristic named-entity recognition
///
/// Groups consecutive capitalized words that are not sentence-initial into
/// multi-word entities. Deterministic and dependency-free.
pub fn named_entities(text: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut sentence_start = true;

    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
        let capitalized = word.chars().next().is_some_and(char::is_uppercase);

        if capitalized && !(sentence_start && current.is_empty()) {
            current.push(word);
        } else if !current.is_empty() {
            entities.push(current.join(" "));
            current.clear();
        }

        sentence_start = raw.ends_with(['.', '!', '?']);
    }
    if !current.is_empty() {
        entities.push(current.join(" "));
    }

    entities.dedup();
    entities
}

/// Run topic and entity enrichment for one record
pub async fn enrich_record(
    long_term: &LongTermMemoryStore,
    generation: &dyn GenerationProvider,
    config: &ExtractionConfig,
    record: &MemoryRecord,
    ctx: &RequestContext,
) -> Result<()> {
    // Extraction may already have proposed labels; only fill gaps.
    if record.topics.is_empty() {
        tag_topics(long_term, generation, config, record, ctx).await?;
    }
    if record.entities.is_empty() {
        extract_entities(long_term, config, record, ctx).await?;
    }
    Ok(())
}

/// Map a terminal enrichment error onto the poisoned flag
pub async fn flag_poisoned(
    long_term: &LongTermMemoryStore,
    id: MemoryId,
    err: &Error,
) -> Result<()> {
    warn!(id = %id, error = %err, "Enrichment poisoned; record retained");
    long_term
        .update(
            id,
            EnrichmentPatch {
                enrichment_failed: Some(true),
                ..Default::default()
            },
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_core::{ManualClock, MemoryType};
    use selkie_llm::{SimEmbeddingProvider, SimGenerationProvider};
    use selkie_store::InMemoryVectorStore;

    const DIM: usize = 8;

    fn setup() -> (LongTermMemoryStore, Arc<dyn TimeProvider>) {
        let time: Arc<dyn TimeProvider> = Arc::new(ManualClock::new(1_000));
        let ltm = LongTermMemoryStore::new(
            Arc::new(InMemoryVectorStore::new(DIM)),
            Arc::clone(&time),
        );
        (ltm, time)
    }

    async fn persisted(ltm: &LongTermMemoryStore, text: &str) -> MemoryRecord {
        let record = MemoryRecord::new(ltm.next_id(), text, MemoryType::Semantic, 0)
            .unwrap()
            .with_user_id("u1");
        ltm.create(record).await.unwrap()
    }

    #[test]
    fn test_local_topics_ranks_by_frequency() {
        let topics = local_topics("tea tea tea ceremony ceremony biscuits", 2);
        assert_eq!(topics, vec!["ceremony".to_string(), "biscuits".to_string()]);
    }

    #[test]
    fn test_local_topics_skips_stopwords_and_short_words() {
        let topics = local_topics("the user and tea cup", 5);
        assert!(!topics.contains(&"the".to_string()));
        assert!(!topics.contains(&"tea".to_string())); // len <= 3
    }

    #[test]
    fn test_named_entities_groups_consecutive() {
        let entities = named_entities("The user visited New York City with Alice last week.");
        assert!(entities.contains(&"New York City".to_string()));
        assert!(entities.contains(&"Alice".to_string()));
    }

    #[test]
    fn test_named_entities_skips_sentence_initial() {
        let entities = named_entities("Yesterday was fine. Nothing happened.");
        assert!(entities.is_empty());
    }

    #[tokio::test]
    async fn test_embed_records_uses_precomputed() {
        let (ltm, time) = setup();
        let embeddings = SimEmbeddingProvider::new(DIM);
        let ctx = RequestContext::new();

        let record = persisted(&ltm, "user likes tea").await;
        let mut precomputed = HashMap::new();
        precomputed.insert(record.id, vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let embedded = embed_records(
            &ltm,
            &embeddings,
            &[record.clone()],
            &precomputed,
            RetryPolicy::none(),
            &time,
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(embedded, 1);
        let read = ltm.get(record.id).await.unwrap().unwrap();
        assert_eq!(read.vector.as_deref(), Some(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0][..]));
    }

    #[tokio::test]
    async fn test_embed_records_batches_missing() {
        let (ltm, time) = setup();
        let embeddings = SimEmbeddingProvider::new(DIM);
        let ctx = RequestContext::new();

        let a = persisted(&ltm, "alpha fact").await;
        let b = persisted(&ltm, "beta fact").await;

        let embedded = embed_records(
            &ltm,
            &embeddings,
            &[a.clone(), b.clone()],
            &HashMap::new(),
            RetryPolicy::none(),
            &time,
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(embedded, 2);
        assert!(ltm.get(a.id).await.unwrap().unwrap().vector.is_some());
        assert!(ltm.get(b.id).await.unwrap().unwrap().vector.is_some());
    }

    #[tokio::test]
    async fn test_embed_retries_transient_failure() {
        let (ltm, time) = setup();
        let embeddings = SimEmbeddingProvider::new(DIM);
        embeddings.fail_next(1);
        let ctx = RequestContext::new();

        let record = persisted(&ltm, "gamma fact").await;
        let embedded = embed_records(
            &ltm,
            &embeddings,
            &[record.clone()],
            &HashMap::new(),
            RetryPolicy::default(),
            &time,
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(embedded, 1);
        let read = ltm.get(record.id).await.unwrap().unwrap();
        assert!(read.vector.is_some());
        assert!(!read.enrichment_failed);
    }

    #[tokio::test]
    async fn test_embed_poisons_on_terminal_failure() {
        let (ltm, time) = setup();
        let embeddings = SimEmbeddingProvider::new(DIM);
        embeddings.fail_next(100);
        let ctx = RequestContext::new();

        let record = persisted(&ltm, "delta fact").await;
        let embedded = embed_records(
            &ltm,
            &embeddings,
            &[record.clone()],
            &HashMap::new(),
            RetryPolicy::none(),
            &time,
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(embedded, 0);
        let read = ltm.get(record.id).await.unwrap().unwrap();
        assert!(read.enrichment_failed);
        assert!(read.vector.is_none());
        // Retained: still readable and countable by filters.
        assert!(read.is_searchable());
    }

    #[tokio::test]
    async fn test_tag_topics_llm_source() {
        let (ltm, _time) = setup();
        let generation = SimGenerationProvider::new();
        let ctx = RequestContext::new();
        let config = ExtractionConfig {
            topic_taxonomy: vec!["travel".into(), "beverages".into()],
            ..Default::default()
        };

        let record = persisted(&ltm, "user packs beverages for travel").await;
        let changed = tag_topics(&ltm, &generation, &config, &record, &ctx)
            .await
            .unwrap();
        assert!(changed);

        let read = ltm.get(record.id).await.unwrap().unwrap();
        assert!(read.topics.contains(&"travel".to_string()));
    }

    #[tokio::test]
    async fn test_tag_topics_local_source_whitelists() {
        let (ltm, _time) = setup();
        let generation = SimGenerationProvider::new();
        let ctx = RequestContext::new();
        let config = ExtractionConfig {
            topic_model_source: TopicModelSource::Local,
            topic_taxonomy: vec!["ceremony".into()],
            ..Default::default()
        };

        let record = persisted(&ltm, "tea ceremony ceremony rituals").await;
        tag_topics(&ltm, &generation, &config, &record, &ctx)
            .await
            .unwrap();

        let read = ltm.get(record.id).await.unwrap().unwrap();
        assert_eq!(read.topics, vec!["ceremony".to_string()]);
    }

    #[tokio::test]
    async fn test_disabled_stages_are_noops() {
        let (ltm, _time) = setup();
        let generation = SimGenerationProvider::new();
        let ctx = RequestContext::new();
        let config = ExtractionConfig {
            enable_topic_extraction: false,
            enable_ner: false,
            ..Default::default()
        };

        let record = persisted(&ltm, "user visited Lisbon with Bob").await;
        assert!(!tag_topics(&ltm, &generation, &config, &record, &ctx)
            .await
            .unwrap());
        assert!(!extract_entities(&ltm, &config, &record, &ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_extract_entities_writes_field() {
        let (ltm, _time) = setup();
        let ctx = RequestContext::new();
        let config = ExtractionConfig::default();

        let record = persisted(&ltm, "user visited Porto with Alice Smith").await;
        assert!(extract_entities(&ltm, &config, &record, &ctx).await.unwrap());

        let read = ltm.get(record.id).await.unwrap().unwrap();
        assert!(read.entities.contains(&"Porto".to_string()));
        assert!(read.entities.contains(&"Alice Smith".to_string()));
    }
}
