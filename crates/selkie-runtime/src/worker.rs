//! Worker pool
//!
//! TigerStyle: Bounded concurrency, explicit timeouts, no lost failures.
//!
//! Workers pull ready tasks, look up the handler by task name, and run it
//! under the per-task wall-clock ceiling. Retriable failures requeue with
//! exponential backoff until the attempt budget is spent, then the task is
//! abandoned with its last error journaled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use selkie_core::{Error, RequestContext, Result, TaskRuntimeConfig, TimeProvider};

use crate::queue::{QueuedTask, TaskQueue};

/// Handler for one task name
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute the task
    async fn handle(&self, args: Value, ctx: &RequestContext) -> Result<()>;
}

/// Registry mapping task names to handlers
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a task name
    ///
    /// Re-registering a name replaces the previous handler.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Look up a handler
    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered task names
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

/// Pool of background workers draining a [`TaskQueue`]
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    registry: Arc<HandlerRegistry>,
    config: TaskRuntimeConfig,
    time: Arc<dyn TimeProvider>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create a pool; call [`WorkerPool::start`] to spawn the workers
    pub fn new(
        queue: Arc<TaskQueue>,
        registry: HandlerRegistry,
        config: TaskRuntimeConfig,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        assert!(config.workers_count > 0, "workers_count must be positive");

        Self {
            queue,
            registry: Arc::new(registry),
            config,
            time,
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    /// Spawn the configured number of workers
    pub fn start(&mut self) {
        assert!(self.handles.is_empty(), "pool already started");

        for worker_index in 0..self.config.workers_count {
            let queue = Arc::clone(&self.queue);
            let registry = Arc::clone(&self.registry);
            let config = self.config.clone();
            let time = Arc::clone(&self.time);
            let shutdown = Arc::clone(&self.shutdown);

            self.handles.push(tokio::spawn(async move {
                worker_loop(worker_index, queue, registry, config, time, shutdown).await;
            }));
        }
    }

    /// Signal shutdown and wait for workers to drain their current task
    pub async fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.queue.wake_all();

        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }

    /// Run tasks inline until the queue is idle (test helper)
    ///
    /// Lets pipeline tests drive background work deterministically without
    /// spawned workers.
    pub async fn drain(&self) {
        while let Some(task) = self.queue.pop_ready() {
            run_one(
                &self.queue,
                &self.registry,
                &self.config,
                &self.time,
                task,
            )
            .await;
        }
    }
}

async fn worker_loop(
    worker_index: usize,
    queue: Arc<TaskQueue>,
    registry: Arc<HandlerRegistry>,
    config: TaskRuntimeConfig,
    time: Arc<dyn TimeProvider>,
    shutdown: Arc<AtomicBool>,
) {
    debug!(worker_index, "Worker started");

    while !shutdown.load(Ordering::Acquire) {
        match queue.pop_ready() {
            Some(task) => {
                run_one(&queue, &registry, &config, &time, task).await;
            }
            None => {
                // Delayed tasks become ready without a notify; poll modestly.
                tokio::select! {
                    _ = queue.ready() => {}
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
            }
        }
    }

    debug!(worker_index, "Worker stopped");
}

async fn run_one(
    queue: &Arc<TaskQueue>,
    registry: &Arc<HandlerRegistry>,
    config: &TaskRuntimeConfig,
    time: &Arc<dyn TimeProvider>,
    task: QueuedTask,
) {
    let fingerprint = task.spec.fingerprint.clone();
    let name = task.spec.name.clone();

    let Some(handler) = registry.get(&name) else {
        error!(task = %name, "No handler registered; abandoning task");
        let _ = queue.abandon(&fingerprint, "no handler registered");
        return;
    };

    let ctx = RequestContext::with_time(Arc::clone(time)).with_timeout_ms(config.task_timeout_ms);
    let outcome = tokio::time::timeout(
        Duration::from_millis(config.task_timeout_ms),
        handler.handle(task.spec.args.clone(), &ctx),
    )
    .await;

    let result = match outcome {
        Ok(result) => result,
        Err(_) => Err(Error::DeadlineExceeded {
            operation: name.clone(),
            elapsed_ms: config.task_timeout_ms,
        }),
    };

    match result {
        Ok(()) => {
            debug!(task = %name, attempt = task.attempt, "Task completed");
            if let Err(err) = queue.complete(&fingerprint) {
                error!(task = %name, error = %err, "Failed to record completion");
            }
        }
        Err(err) => {
            let attempt = task.attempt + 1;
            if attempt < config.attempts_max && err.is_retriable() {
                let backoff_ms = retry_backoff_ms(attempt);
                warn!(
                    task = %name,
                    attempt,
                    attempts_max = config.attempts_max,
                    backoff_ms,
                    error = %err,
                    "Task failed; retrying"
                );
                let spec = task.spec.clone().with_delay_ms(backoff_ms);
                if let Err(requeue_err) = queue.requeue(spec, attempt, err.to_string()) {
                    error!(task = %name, error = %requeue_err, "Failed to requeue task");
                }
            } else {
                error!(
                    task = %name,
                    attempt,
                    error = %err,
                    "Task failed terminally"
                );
                let _ = queue.abandon(&fingerprint, &err.to_string());
            }
        }
    }
}

/// Exponential backoff for task retries: 1s, 2s, 4s, ... capped at 60s
fn retry_backoff_ms(attempt: u32) -> u64 {
    let shift = attempt.min(6);
    (1000u64 << shift).min(60_000)
}
