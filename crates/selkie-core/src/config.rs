//! Configuration for Selkie
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.
//!
//! One snapshot is loaded at startup and passed down explicitly; core code
//! never reads configuration from globals.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::telemetry::TelemetryConfig;

/// Main configuration for the memory service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Backing store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding and generation model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Extraction and enrichment configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Working memory summarization configuration
    #[serde(default)]
    pub summarization: SummarizationConfig,

    /// Periodic compaction configuration
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Periodic forgetting configuration
    #[serde(default)]
    pub forgetting: ForgettingConfig,

    /// Search re-ranking weights
    #[serde(default)]
    pub rerank: RerankWeights,

    /// Background task runtime configuration
    #[serde(default)]
    pub tasks: TaskRuntimeConfig,

    /// Logging and span export configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl MemoryConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.embedding.validate()?;
        self.extraction.validate()?;
        self.summarization.validate()?;
        self.compaction.validate()?;
        self.forgetting.validate()?;
        self.tasks.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }
}

/// Backing store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store backend type
    #[serde(default)]
    pub backend: StoreBackend,

    /// Connection URL for a remote backend (ignored by the in-memory backend)
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Vector index name
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Embedding dimension enforced by the index
    #[serde(default = "default_vector_dimensions")]
    pub vector_dimensions: usize,

    /// Distance metric (cosine is the only supported metric)
    #[serde(default = "default_distance_metric")]
    pub distance_metric: String,

    /// Indexing algorithm for the vector index
    #[serde(default = "default_indexing_algorithm")]
    pub indexing_algorithm: String,

    /// Default working memory TTL in seconds
    #[serde(default = "default_wm_ttl_secs")]
    pub default_wm_ttl_secs: u64,

    /// Whether long-term memory is enabled at all
    #[serde(default = "default_true")]
    pub long_term_memory_enabled: bool,
}

/// Store backend type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-memory store (for testing and simulation)
    #[default]
    Memory,

    /// Redis vector + hash store (for production)
    Redis,
}

fn default_store_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_index_name() -> String {
    VECTOR_INDEX_NAME.to_string()
}

fn default_vector_dimensions() -> usize {
    1536
}

fn default_distance_metric() -> String {
    "cosine".to_string()
}

fn default_indexing_algorithm() -> String {
    "hnsw".to_string()
}

fn default_wm_ttl_secs() -> u64 {
    WORKING_MEMORY_TTL_SECS_DEFAULT
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: default_store_url(),
            index_name: default_index_name(),
            vector_dimensions: default_vector_dimensions(),
            distance_metric: default_distance_metric(),
            indexing_algorithm: default_indexing_algorithm(),
            default_wm_ttl_secs: default_wm_ttl_secs(),
            long_term_memory_enabled: true,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        if self.vector_dimensions == 0 {
            return Err(Error::InvalidConfiguration {
                field: "store.vector_dimensions".into(),
                reason: "must be positive".into(),
            });
        }
        if self.distance_metric != "cosine" {
            return Err(Error::InvalidConfiguration {
                field: "store.distance_metric".into(),
                reason: format!("unsupported metric '{}'", self.distance_metric),
            });
        }
        if self.index_name.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "store.index_name".into(),
                reason: "must not be empty".into(),
            });
        }
        if matches!(self.backend, StoreBackend::Redis) && self.url.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "store.url".into(),
                reason: "required when backend is redis".into(),
            });
        }
        Ok(())
    }
}

/// Embedding and generation model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model identifier
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Fast generation model, used for query optimization and topic tagging
    #[serde(default = "default_fast_model")]
    pub generation_model_fast: String,

    /// Slow generation model, used for extraction and summarization
    #[serde(default = "default_slow_model")]
    pub generation_model_slow: String,

    /// Maximum texts per embedding provider call
    #[serde(default = "default_embed_batch")]
    pub embed_batch_count_max: usize,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_fast_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_slow_model() -> String {
    "gpt-4o".to_string()
}

fn default_embed_batch() -> usize {
    EMBED_BATCH_COUNT_MAX
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embedding_model: default_embedding_model(),
            generation_model_fast: default_fast_model(),
            generation_model_slow: default_slow_model(),
            embed_batch_count_max: default_embed_batch(),
        }
    }
}

impl EmbeddingConfig {
    fn validate(&self) -> Result<()> {
        if self.embed_batch_count_max == 0 {
            return Err(Error::InvalidConfiguration {
                field: "embedding.embed_batch_count_max".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Extraction and enrichment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Whether discrete memory extraction runs during promotion
    #[serde(default = "default_true")]
    pub enable_discrete_extraction: bool,

    /// Whether topic tagging runs during enrichment
    #[serde(default = "default_true")]
    pub enable_topic_extraction: bool,

    /// Whether named-entity recognition runs during enrichment
    #[serde(default = "default_true")]
    pub enable_ner: bool,

    /// Topic source: LLM classification or the local keyword model
    #[serde(default)]
    pub topic_model_source: TopicModelSource,

    /// Number of topics attached per record
    #[serde(default = "default_top_k_topics")]
    pub top_k_topics: usize,

    /// Optional fixed taxonomy; produced topics are whitelisted against it
    #[serde(default)]
    pub topic_taxonomy: Vec<String>,

    /// Cosine distance at or below which candidates dedup
    #[serde(default = "default_dedup_threshold")]
    pub dedup_distance_threshold: f64,
}

/// Source used for topic tagging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicModelSource {
    /// Classify with the fast generation model
    #[default]
    Llm,
    /// Local keyword model, no provider call
    Local,
}

fn default_top_k_topics() -> usize {
    3
}

fn default_dedup_threshold() -> f64 {
    DEDUP_DISTANCE_THRESHOLD_DEFAULT
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enable_discrete_extraction: true,
            enable_topic_extraction: true,
            enable_ner: true,
            topic_model_source: TopicModelSource::default(),
            top_k_topics: default_top_k_topics(),
            topic_taxonomy: Vec::new(),
            dedup_distance_threshold: default_dedup_threshold(),
        }
    }
}

impl ExtractionConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.dedup_distance_threshold) {
            return Err(Error::InvalidConfiguration {
                field: "extraction.dedup_distance_threshold".into(),
                reason: "must be within [0, 1]".into(),
            });
        }
        if self.top_k_topics == 0 || self.top_k_topics > MEMORY_TOPICS_COUNT_MAX {
            return Err(Error::InvalidConfiguration {
                field: "extraction.top_k_topics".into(),
                reason: format!("must be in 1..={}", MEMORY_TOPICS_COUNT_MAX),
            });
        }
        Ok(())
    }
}

/// Working memory summarization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationConfig {
    /// Token budget assumed for the client context window
    #[serde(default = "default_context_window")]
    pub context_window_max: u32,

    /// Fraction of the window that triggers summarization
    #[serde(default = "default_summarization_threshold")]
    pub summarization_threshold: f64,

    /// Number of most recent messages kept verbatim after summarization
    #[serde(default = "default_keep_recent")]
    pub keep_recent_messages: usize,
}

fn default_context_window() -> u32 {
    CONTEXT_WINDOW_TOKENS_DEFAULT
}

fn default_summarization_threshold() -> f64 {
    SUMMARIZATION_THRESHOLD_DEFAULT
}

fn default_keep_recent() -> usize {
    20
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            context_window_max: default_context_window(),
            summarization_threshold: default_summarization_threshold(),
            keep_recent_messages: default_keep_recent(),
        }
    }
}

impl SummarizationConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.summarization_threshold) {
            return Err(Error::InvalidConfiguration {
                field: "summarization.summarization_threshold".into(),
                reason: "must be within [0, 1]".into(),
            });
        }
        if self.context_window_max == 0 {
            return Err(Error::InvalidConfiguration {
                field: "summarization.context_window_max".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Periodic compaction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Minutes between compaction runs (0 disables compaction)
    #[serde(default = "default_compaction_minutes")]
    pub compaction_every_minutes: u64,

    /// Maximum records scanned per run
    #[serde(default = "default_compaction_window")]
    pub window_records_max: usize,
}

fn default_compaction_minutes() -> u64 {
    60
}

fn default_compaction_window() -> usize {
    COMPACTION_WINDOW_RECORDS_MAX
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            compaction_every_minutes: default_compaction_minutes(),
            window_records_max: default_compaction_window(),
        }
    }
}

impl CompactionConfig {
    fn validate(&self) -> Result<()> {
        if self.window_records_max == 0 {
            return Err(Error::InvalidConfiguration {
                field: "compaction.window_records_max".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Periodic forgetting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgettingConfig {
    /// Whether the forgetting pass runs at all
    #[serde(default)]
    pub forgetting_enabled: bool,

    /// Records not accessed for this many days become candidates
    #[serde(default = "default_forgetting_age")]
    pub forgetting_max_age_days: u64,

    /// Records accessed at least this many times are retained
    #[serde(default = "default_forgetting_access")]
    pub forgetting_min_access: u64,
}

fn default_forgetting_age() -> u64 {
    90
}

fn default_forgetting_access() -> u64 {
    5
}

impl Default for ForgettingConfig {
    fn default() -> Self {
        Self {
            forgetting_enabled: false,
            forgetting_max_age_days: default_forgetting_age(),
            forgetting_min_access: default_forgetting_access(),
        }
    }
}

impl ForgettingConfig {
    fn validate(&self) -> Result<()> {
        if self.forgetting_enabled && self.forgetting_max_age_days == 0 {
            return Err(Error::InvalidConfiguration {
                field: "forgetting.forgetting_max_age_days".into(),
                reason: "must be positive when forgetting is enabled".into(),
            });
        }
        Ok(())
    }
}

/// Search re-ranking weights
///
/// `score = alpha * similarity + beta * recency + gamma * log(1 + access_count)`.
/// Defaults select pure similarity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RerankWeights {
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub beta: f64,
    #[serde(default)]
    pub gamma: f64,
}

fn default_alpha() -> f64 {
    1.0
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.0,
            gamma: 0.0,
        }
    }
}

impl RerankWeights {
    /// True when the weights select pure similarity ordering
    pub fn is_similarity_only(&self) -> bool {
        self.beta == 0.0 && self.gamma == 0.0
    }
}

/// Background task runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRuntimeConfig {
    /// Number of background workers
    #[serde(default = "default_workers")]
    pub workers_count: usize,

    /// Per-task wall-clock ceiling in milliseconds
    #[serde(default = "default_task_timeout")]
    pub task_timeout_ms: u64,

    /// Maximum attempts before a task fails terminally
    #[serde(default = "default_task_attempts")]
    pub attempts_max: u32,

    /// Maximum queue depth
    #[serde(default = "default_queue_depth")]
    pub queue_depth_max: usize,
}

fn default_workers() -> usize {
    TASK_WORKERS_COUNT_DEFAULT
}

fn default_task_timeout() -> u64 {
    TASK_TIMEOUT_MS_DEFAULT
}

fn default_task_attempts() -> u32 {
    TASK_ATTEMPTS_MAX_DEFAULT
}

fn default_queue_depth() -> usize {
    TASK_QUEUE_DEPTH_MAX
}

impl Default for TaskRuntimeConfig {
    fn default() -> Self {
        Self {
            workers_count: default_workers(),
            task_timeout_ms: default_task_timeout(),
            attempts_max: default_task_attempts(),
            queue_depth_max: default_queue_depth(),
        }
    }
}

impl TaskRuntimeConfig {
    fn validate(&self) -> Result<()> {
        if self.workers_count == 0 {
            return Err(Error::InvalidConfiguration {
                field: "tasks.workers_count".into(),
                reason: "must be positive".into(),
            });
        }
        if self.queue_depth_max == 0 || self.queue_depth_max > TASK_QUEUE_DEPTH_MAX {
            return Err(Error::InvalidConfiguration {
                field: "tasks.queue_depth_max".into(),
                reason: format!("must be in 1..={}", TASK_QUEUE_DEPTH_MAX),
            });
        }
        if self.attempts_max == 0 {
            return Err(Error::InvalidConfiguration {
                field: "tasks.attempts_max".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}
