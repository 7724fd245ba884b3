//! Selkie Store
//!
//! Backend-agnostic vector store contract for long-term memory records,
//! plus the in-memory reference backend used by tests and simulations.
//!
//! # Overview
//!
//! The [`VectorStore`] trait is the narrow waist between the memory service
//! and whatever holds the records: put/get/delete by id, field-granular
//! enrichment updates, filtered vector search, and exact counting.
//! Production deployments select a remote backend through
//! `StoreConfig::backend`; the [`InMemoryVectorStore`] implements the full
//! contract over a process-local map and is the default for tests.

pub mod adapter;
pub mod filter;
pub mod memory;

pub use adapter::{cosine_distance, SearchHit, SearchPage, VectorQuery, VectorStore};
pub use filter::{Filters, RangeFilter, TagFilter};
pub use memory::InMemoryVectorStore;
