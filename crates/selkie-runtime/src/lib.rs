//! Selkie Runtime
//!
//! Background task runtime for the memory service.
//!
//! # Overview
//!
//! Pipeline stages run as named background tasks. The runtime provides:
//!
//! - [`TaskSpec`]: stable string task names, JSON args, and a stable
//!   fingerprint over both
//! - [`TaskQueue`]: bounded FIFO with at-most-one-in-flight-or-queued per
//!   fingerprint and an optional append-only journal for crash recovery
//! - [`WorkerPool`]: handler registry, per-task wall-clock ceiling, retry
//!   with exponential backoff, last-error recording
//! - [`PeriodicScheduler`]: fixed-interval enqueue for compaction and
//!   forgetting
//!
//! Execution is at-least-once; stage idempotence makes that safe.

pub mod journal;
pub mod periodic;
pub mod queue;
pub mod task;
pub mod worker;

pub use journal::{FileTaskJournal, JournalEntry, MemoryTaskJournal, TaskJournal};
pub use periodic::PeriodicScheduler;
pub use queue::{EnqueueOutcome, QueuedTask, TaskQueue};
pub use task::{NullTaskSink, TaskSink, TaskSpec};
pub use worker::{HandlerRegistry, TaskHandler, WorkerPool};
