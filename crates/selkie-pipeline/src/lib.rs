//! Selkie Pipeline
//!
//! The promotion and enrichment pipeline: everything that moves content from
//! working memory into enriched, deduplicated long-term records, plus the
//! periodic compaction and forgetting passes.
//!
//! # Stages
//!
//! Each stage is idempotent and independently re-runnable:
//!
//! 1. extract from session (messages above the promotion watermark)
//! 2. dedup batch (exact by hash, then semantic by vector + containment)
//! 3. embed (batched, retried; poisoned records flagged but retained)
//! 4. tag topics
//! 5. extract entities
//! 6. persist (idempotent by hash)
//! 7. advance watermark
//!
//! Plus `summarize_session` (threshold-triggered), `compact` and `forget`
//! (periodic). The [`Pipeline`] struct wires the stores and providers
//! together; [`handlers::register_handlers`] exposes every stage as a named
//! background task.

pub mod compact;
pub mod dedupe;
pub mod enrich;
pub mod forget;
pub mod handlers;
pub mod pipeline;
pub mod strategy;
pub mod summarize;
pub mod validator;
pub mod watermark;

pub use compact::CompactionReport;
pub use dedupe::{DedupeDecision, DedupeOutcome, SurvivingCandidate};
pub use forget::ForgettingReport;
pub use handlers::{
    register_handlers, COMPACT_TASK, FORGET_TASK, PROMOTE_SESSION_TASK, TOUCH_TASK,
};
pub use pipeline::{Pipeline, PromotionReport};
pub use strategy::{extract_candidates, ExtractedMemory};
pub use summarize::summarize_session;
pub use validator::validate_custom_prompt;
pub use watermark::WatermarkStore;
