//! Deterministic sim providers
//!
//! For testing and simulations. Embeddings are a pure function of the text,
//! generation is scriptable, and both can inject transient failures, so
//! pipeline behaviour (retries, poisoning, dedup distances) is reproducible
//! without network access.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use selkie_core::{Error, Result};

use crate::provider::{EmbeddingProvider, GenerationProvider};

/// Deterministic embedding provider
///
/// Generates normalized pseudo-random vectors seeded by text content.
/// Tests that need exact distances can pin vectors per text.
pub struct SimEmbeddingProvider {
    dimension: usize,
    pinned: Mutex<HashMap<String, Vec<f32>>>,
    fail_remaining: Mutex<u32>,
}

impl SimEmbeddingProvider {
    /// Create a provider with the given dimension
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "embedding dimension must be positive");
        Self {
            dimension,
            pinned: Mutex::new(HashMap::new()),
            fail_remaining: Mutex::new(0),
        }
    }

    /// Pin the exact vector returned for a text
    ///
    /// The vector must match the provider dimension.
    pub fn pin(&self, text: impl Into<String>, vector: Vec<f32>) {
        assert_eq!(
            vector.len(),
            self.dimension,
            "pinned vector dimension mismatch"
        );
        self.pinned
            .lock()
            .expect("pinned lock poisoned")
            .insert(text.into(), vector);
    }

    /// Make the next `count` calls fail with a transient provider error
    pub fn fail_next(&self, count: u32) {
        *self.fail_remaining.lock().expect("fail lock poisoned") = count;
    }

    fn take_failure(&self) -> bool {
        let mut remaining = self.fail_remaining.lock().expect("fail lock poisoned");
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }

    fn hash_embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        let mut seed: u64 = 0;
        for (i, &byte) in text.as_bytes().iter().enumerate() {
            seed = seed.wrapping_add(u64::from(byte) * (i as u64 + 1));
            seed = seed.wrapping_mul(31);
        }

        for (i, value) in embedding.iter_mut().enumerate() {
            let combined = seed.wrapping_add(i as u64);
            let hash = combined.wrapping_mul(0x517c_c1b7_2722_0a95);
            *value = ((hash as i64) as f32) / (i64::MAX as f32);
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for SimEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "sim-embedder"
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if self.take_failure() {
            return Err(Error::provider_failure("sim-embedder", "injected failure"));
        }

        let pinned = self.pinned.lock().expect("pinned lock poisoned");
        Ok(texts
            .iter()
            .map(|text| {
                pinned
                    .get(*text)
                    .cloned()
                    .unwrap_or_else(|| self.hash_embed(text))
            })
            .collect())
    }
}

/// Scriptable generation provider
///
/// Responses queued with [`SimGenerationProvider::push_response`] are
/// returned in order; once exhausted, `generate` falls back to an empty
/// extraction payload and `classify` to a deterministic keyword model.
pub struct SimGenerationProvider {
    responses: Mutex<VecDeque<String>>,
    fail_remaining: Mutex<u32>,
    calls: Mutex<Vec<String>>,
}

impl SimGenerationProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fail_remaining: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response for a future `generate` call
    pub fn push_response(&self, response: impl Into<String>) {
        self.responses
            .lock()
            .expect("responses lock poisoned")
            .push_back(response.into());
    }

    /// Make the next `count` calls fail with a transient provider error
    pub fn fail_next(&self, count: u32) {
        *self.fail_remaining.lock().expect("fail lock poisoned") = count;
    }

    /// Prompts received so far, for assertions
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    fn take_failure(&self) -> bool {
        let mut remaining = self.fail_remaining.lock().expect("fail lock poisoned");
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

impl Default for SimGenerationProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Words too generic to be useful keyword labels
const KEYWORD_STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "user", "about", "their", "have", "has",
    "was", "were", "are",
];

#[async_trait]
impl GenerationProvider for SimGenerationProvider {
    fn model_name(&self) -> &str {
        "sim-generator"
    }

    async fn generate(&self, prompt: &str, _model: &str, _max_tokens: u32) -> Result<String> {
        if self.take_failure() {
            return Err(Error::provider_failure("sim-generator", "injected failure"));
        }

        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(prompt.to_string());

        let scripted = self
            .responses
            .lock()
            .expect("responses lock poisoned")
            .pop_front();
        Ok(scripted.unwrap_or_else(|| r#"{"memories": []}"#.to_string()))
    }

    async fn classify(&self, text: &str, taxonomy: &[String], top_k: usize) -> Result<Vec<String>> {
        if self.take_failure() {
            return Err(Error::provider_failure("sim-generator", "injected failure"));
        }

        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2 && !KEYWORD_STOPWORDS.contains(w))
            .collect();

        let mut labels: Vec<String> = Vec::new();
        if taxonomy.is_empty() {
            for word in words {
                let word = word.to_string();
                if !labels.contains(&word) {
                    labels.push(word);
                }
                if labels.len() >= top_k {
                    break;
                }
            }
        } else {
            for label in taxonomy {
                if lower.contains(&label.to_lowercase()) && !labels.contains(label) {
                    labels.push(label.clone());
                }
                if labels.len() >= top_k {
                    break;
                }
            }
        }

        Ok(labels)
    }
}
