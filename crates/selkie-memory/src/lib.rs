//! Selkie Memory
//!
//! The two memory tiers of the service.
//!
//! # Overview
//!
//! - [`WorkingMemoryStore`]: session-scoped mutable state with TTL renewal,
//!   atomic message append, staged memories, and the summarization trigger
//! - [`LongTermMemoryStore`]: facade over the vector store that owns the
//!   content hash, the exact-dedup fast path, supersession, and access
//!   touching, while enforcing record immutability
//!
//! Records move from working to long-term memory through the promotion
//! pipeline; this crate only defines the stores and their invariants.

pub mod hash;
pub mod long_term;
pub mod tokens;
pub mod working;

pub use hash::{memory_hash, record_hash};
pub use long_term::LongTermMemoryStore;
pub use tokens::{HeuristicTokenCounter, TokenCounter};
pub use working::{WorkingMemory, WorkingMemoryStore, SUMMARIZE_SESSION_TASK};
