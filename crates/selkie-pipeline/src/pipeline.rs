//! Promotion orchestration
//!
//! TigerStyle: One pass, explicit report, safe to re-run.
//!
//! `promote_session` composes the stages for one session: read messages
//! above the watermark, run the extraction strategy, index raw messages,
//! dedup, persist, enrich, then advance the watermark to the highest
//! processed message id. Every stage is idempotent, so a crash anywhere
//! leaves a state the next run completes from.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use selkie_core::{
    MemoryConfig, MemoryRecord, MemoryType, RequestContext, Result, SessionKey, TimeProvider,
    EXTRACTION_BATCH_COUNT_MAX,
};
use selkie_llm::{EmbeddingProvider, GenerationProvider, RetryPolicy};
use selkie_memory::{LongTermMemoryStore, WorkingMemoryStore};

use crate::dedupe::{dedupe_batch, DedupeDecision};
use crate::enrich::{embed_records, enrich_record};
use crate::strategy::extract_candidates;
use crate::watermark::WatermarkStore;

/// What one promotion pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PromotionReport {
    /// Messages above the watermark that were processed
    pub messages_processed: usize,
    /// Candidates produced by extraction and staging
    pub candidates: usize,
    /// Records persisted to long-term memory
    pub persisted: usize,
    /// Candidates dropped by exact dedup
    pub exact_dropped: usize,
    /// Candidates dropped by semantic dedup
    pub semantic_dropped: usize,
    /// Existing records superseded by new candidates
    pub superseded: usize,
}

/// Shared stores and providers for the pipeline stages
pub struct Pipeline {
    pub config: MemoryConfig,
    pub working: Arc<WorkingMemoryStore>,
    pub long_term: Arc<LongTermMemoryStore>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub generation: Arc<dyn GenerationProvider>,
    pub watermarks: Arc<WatermarkStore>,
    pub time: Arc<dyn TimeProvider>,
}

impl Pipeline {
    /// Promote one session's working memory into long-term records
    ///
    /// Re-running with an advanced watermark and nothing staged is a no-op.
    pub async fn promote_session(
        &self,
        session: &SessionKey,
        ctx: &RequestContext,
    ) -> Result<PromotionReport> {
        let mut report = PromotionReport::default();
        if !self.config.store.long_term_memory_enabled {
            return Ok(report);
        }

        let Some(wm) = self.working.get(session, None).await? else {
            return Ok(report);
        };

        let session_key = session.storage_key();
        let watermark = self.watermarks.get(&session_key);
        let new_messages: Vec<_> = wm
            .messages
            .iter()
            .filter(|m| m.id > watermark)
            .cloned()
            .collect();
        report.messages_processed = new_messages.len();

        let now = self.time.now_ms();
        let mut candidates: Vec<MemoryRecord> = Vec::new();

        // Client-staged records promote as-is.
        let staged_ids: Vec<_> = wm.memories.iter().map(|r| r.id).collect();
        for staged in &wm.memories {
            let mut record = staged.clone();
            if record.namespace.is_none() {
                record.namespace = session.namespace.clone();
            }
            if record.user_id.is_none() {
                record.user_id = session.user_id.clone();
            }
            if record.session_id.is_none() {
                record.session_id = Some(session.session_id.clone());
            }
            candidates.push(record);
        }

        // Raw messages index as message-type records.
        for message in &new_messages {
            let record = MemoryRecord::new(
                self.long_term.next_id(),
                message.render(),
                MemoryType::Message,
                now,
            )?
            .with_session_id(session.session_id.clone())
            .with_source_ids(vec![message.id]);
            let record = scope_to_session(record, session);
            candidates.push(record);
        }

        // Strategy extraction over the new segment.
        if self.config.extraction.enable_discrete_extraction && !new_messages.is_empty() {
            let extracted = extract_candidates(
                &wm.strategy,
                &new_messages,
                self.generation.as_ref(),
                &self.config.embedding.generation_model_slow,
                self.config.extraction.top_k_topics,
                ctx,
            )
            .await?;

            let source_ids: Vec<_> = new_messages.iter().map(|m| m.id).collect();
            for extracted in extracted {
                let mut record = MemoryRecord::new(
                    self.long_term.next_id(),
                    extracted.text.clone(),
                    extracted.memory_type(),
                    now,
                )?
                .with_source_ids(source_ids.clone());
                record.topics = extracted.topics;
                record.entities = extracted.entities;
                let record = scope_to_session(record, session);
                candidates.push(record);
            }
        }

        if candidates.len() > EXTRACTION_BATCH_COUNT_MAX {
            candidates.truncate(EXTRACTION_BATCH_COUNT_MAX);
            debug!(
                session = %session_key,
                limit = EXTRACTION_BATCH_COUNT_MAX,
                "Candidate batch truncated"
            );
        }
        report.candidates = candidates.len();

        // Dedup decides; persistence and supersession apply below.
        let outcome = dedupe_batch(
            self.long_term.as_ref(),
            self.embeddings.as_ref(),
            candidates,
            self.config.extraction.dedup_distance_threshold,
            ctx,
        )
        .await?;
        report.exact_dropped = outcome.exact_dropped;
        report.semantic_dropped = outcome.semantic_dropped;

        if !outcome.touched.is_empty() {
            self.long_term.touch(&outcome.touched).await?;
        }

        let mut persisted: Vec<MemoryRecord> = Vec::new();
        let mut vectors: HashMap<_, _> = HashMap::new();
        for surviving in outcome.kept {
            let created = self.long_term.create(surviving.record).await?;
            vectors.insert(created.id, surviving.vector);

            if let DedupeDecision::KeepAndSupersede(old_id) = surviving.decision {
                self.long_term.supersede(old_id, created.id).await?;
                report.superseded += 1;
            }
            persisted.push(created);
        }
        report.persisted = persisted.len();

        // Enrichment: vectors from dedup, then topics and entities.
        embed_records(
            self.long_term.as_ref(),
            self.embeddings.as_ref(),
            &persisted,
            &vectors,
            RetryPolicy::default(),
            &self.time,
            ctx,
        )
        .await?;
        for record in &persisted {
            enrich_record(
                self.long_term.as_ref(),
                self.generation.as_ref(),
                &self.config.extraction,
                record,
                ctx,
            )
            .await?;
        }

        // Promotion complete: clear staged records, advance the watermark.
        if !staged_ids.is_empty() {
            self.working.remove_staged(session, &staged_ids).await?;
        }
        if let Some(max_id) = new_messages.iter().map(|m| m.id).max() {
            self.watermarks.advance(&session_key, max_id)?;
        }

        info!(
            session = %session_key,
            messages = report.messages_processed,
            persisted = report.persisted,
            exact_dropped = report.exact_dropped,
            semantic_dropped = report.semantic_dropped,
            superseded = report.superseded,
            "Promotion pass complete"
        );
        Ok(report)
    }
}

fn scope_to_session(record: MemoryRecord, session: &SessionKey) -> MemoryRecord {
    let mut record = record;
    record.namespace = session.namespace.clone();
    record.user_id = session.user_id.clone();
    record.session_id = Some(session.session_id.clone());
    record
}
