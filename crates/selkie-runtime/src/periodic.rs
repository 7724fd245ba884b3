//! Periodic task scheduling
//!
//! TigerStyle: Fixed intervals, one outstanding run per task.
//!
//! Periodic tasks (compaction, forgetting) enqueue with fingerprint equal to
//! the task name. A run that outlasts its interval therefore coalesces with
//! the next tick instead of stacking behind itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::queue::TaskQueue;
use crate::task::{TaskSink, TaskSpec};

/// Spawns interval loops that feed the task queue
pub struct PeriodicScheduler {
    queue: Arc<TaskQueue>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl PeriodicScheduler {
    /// Create a scheduler over the given queue
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self {
            queue,
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    /// Enqueue `name` every `interval`; the first tick fires after one interval
    pub fn schedule_periodic(&mut self, name: impl Into<String>, interval: Duration) {
        let name = name.into();
        assert!(!name.is_empty(), "task name must not be empty");
        assert!(!interval.is_zero(), "interval must be positive");

        let queue = Arc::clone(&self.queue);
        let shutdown = Arc::clone(&self.shutdown);

        self.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval() fires immediately; consume the first tick so the
            // task first runs one full interval after startup.
            ticker.tick().await;

            while !shutdown.load(Ordering::Acquire) {
                ticker.tick().await;
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                let spec = TaskSpec::with_fingerprint(name.clone(), Value::Null, name.clone());
                match queue.enqueue(spec) {
                    Ok(true) => debug!(task = %name, "Periodic task enqueued"),
                    Ok(false) => debug!(task = %name, "Periodic task still outstanding; skipped"),
                    Err(err) => {
                        tracing::warn!(task = %name, error = %err, "Periodic enqueue failed")
                    }
                }
            }
        }));
    }

    /// Stop all interval loops
    pub async fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
    }
}
