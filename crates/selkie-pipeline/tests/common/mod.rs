//! Shared harness for pipeline integration tests
//!
//! Builds a full pipeline over the in-memory store and the deterministic
//! sim providers, with a manual clock so TTLs and ages are scripted.
#![allow(dead_code)]

use std::sync::Arc;

use selkie_core::{ManualClock, MemoryConfig, SessionKey, TimeProvider};
use selkie_llm::{SimEmbeddingProvider, SimGenerationProvider};
use selkie_memory::{HeuristicTokenCounter, LongTermMemoryStore, WorkingMemoryStore};
use selkie_pipeline::{Pipeline, WatermarkStore};
use selkie_store::InMemoryVectorStore;

pub const DIM: usize = 16;

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub embeddings: Arc<SimEmbeddingProvider>,
    pub generation: Arc<SimGenerationProvider>,
    pub pipeline: Pipeline,
}

pub fn harness() -> Harness {
    harness_with_config(MemoryConfig::default())
}

pub fn harness_with_config(config: MemoryConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let time: Arc<dyn TimeProvider> = clock.clone();

    let embeddings = Arc::new(SimEmbeddingProvider::new(DIM));
    let generation = Arc::new(SimGenerationProvider::new());

    let working = Arc::new(WorkingMemoryStore::new(
        Arc::clone(&time),
        Arc::new(HeuristicTokenCounter),
        config.summarization.clone(),
        config.store.default_wm_ttl_secs,
    ));
    let long_term = Arc::new(LongTermMemoryStore::new(
        Arc::new(InMemoryVectorStore::new(DIM)),
        Arc::clone(&time),
    ));

    let pipeline = Pipeline {
        config,
        working,
        long_term,
        embeddings: embeddings.clone(),
        generation: generation.clone(),
        watermarks: Arc::new(WatermarkStore::new()),
        time,
    };

    Harness {
        clock,
        embeddings,
        generation,
        pipeline,
    }
}

pub fn session(id: &str) -> SessionKey {
    SessionKey::new(Some("n1".into()), Some("u1".into()), id).unwrap()
}

/// A pinned unit vector along one axis
pub fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    v
}
