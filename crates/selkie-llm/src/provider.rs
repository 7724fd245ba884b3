//! Provider traits
//!
//! TigerStyle: Trait-based providers with explicit dimension constraints.
//!
//! The service depends on two outbound capabilities: turning text into
//! vectors and generating/classifying text with a model. Both are behind
//! traits so production clients, local models, and deterministic sims are
//! interchangeable.

use async_trait::async_trait;

use selkie_core::Result;

/// Common embedding dimensions for popular models
pub const EMBEDDING_DIM_384: usize = 384; // all-MiniLM-L6-v2
pub const EMBEDDING_DIM_768: usize = 768; // all-mpnet-base-v2
pub const EMBEDDING_DIM_1536: usize = 1536; // OpenAI text-embedding-3-small

/// Trait for generating text embeddings
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the dimension of embeddings produced by this provider
    fn dimension(&self) -> usize;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;

    /// Embed a single text string
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors.pop().ok_or_else(|| {
            selkie_core::Error::provider_failure(self.model_name(), "empty embedding batch")
        })
    }

    /// Embed multiple texts in a batch (more efficient for many texts)
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Trait for text generation and classification
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Get the default model identifier
    fn model_name(&self) -> &str;

    /// Generate a completion for a prompt
    async fn generate(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String>;

    /// Classify text against a label set, returning up to `top_k` labels
    ///
    /// An empty taxonomy selects open-vocabulary labelling.
    async fn classify(&self, text: &str, taxonomy: &[String], top_k: usize) -> Result<Vec<String>>;
}
