//! Background task queue
//!
//! TigerStyle: Bounded queue with explicit limits, no silent drops.
//!
//! The queue enforces at-most-one-in-flight-or-queued per fingerprint: an
//! enqueue whose fingerprint is already pending or running coalesces instead
//! of stacking duplicate work. Admission beyond the depth limit is an error,
//! never a drop.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use selkie_core::{Error, Result, TimeProvider, TASK_QUEUE_DEPTH_MAX};

use crate::journal::{JournalEntry, TaskJournal};
use crate::task::{TaskSink, TaskSpec};

/// Outcome of an enqueue call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The task was admitted
    Admitted,
    /// Work with the same fingerprint is already pending or running
    Coalesced,
}

/// A task admitted to the queue, with its retry state
#[derive(Debug, Clone)]
pub struct QueuedTask {
    /// The task specification
    pub spec: TaskSpec,
    /// Zero-based attempt number
    pub attempt: u32,
    /// Last error observed for this fingerprint, if any
    pub last_error: Option<String>,
    /// Earliest time the task may run, epoch milliseconds
    pub not_before_ms: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<QueuedTask>,
    pending_fingerprints: HashSet<String>,
    in_flight: HashSet<String>,
}

/// Bounded background task queue
pub struct TaskQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
    journal: Option<Arc<dyn TaskJournal>>,
    time: Arc<dyn TimeProvider>,
}

impl TaskQueue {
    /// Create a queue with the given capacity and no journal
    pub fn new(capacity: usize, time: Arc<dyn TimeProvider>) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        assert!(
            capacity <= TASK_QUEUE_DEPTH_MAX,
            "capacity exceeds TASK_QUEUE_DEPTH_MAX"
        );

        Self {
            capacity,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            journal: None,
            time,
        }
    }

    /// Attach a journal; every admission and completion is recorded
    pub fn with_journal(mut self, journal: Arc<dyn TaskJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Recover from the journal: re-enqueue work that never completed
    ///
    /// Entries replay in order; a task is pending again if its most recent
    /// enqueue has no matching completion or abandonment. Fingerprint
    /// coalescing applies, so double recovery is harmless.
    pub fn recover(&self) -> Result<usize> {
        let Some(ref journal) = self.journal else {
            return Ok(0);
        };

        let mut incomplete: Vec<TaskSpec> = Vec::new();
        for entry in journal.replay()? {
            match entry {
                JournalEntry::Enqueued { spec } => {
                    incomplete.retain(|s| s.fingerprint != spec.fingerprint);
                    incomplete.push(spec);
                }
                JournalEntry::Completed { fingerprint }
                | JournalEntry::Abandoned { fingerprint, .. } => {
                    incomplete.retain(|s| s.fingerprint != fingerprint);
                }
                JournalEntry::Mark { .. } => {}
            }
        }

        let mut recovered = 0;
        for spec in incomplete {
            if self.admit(spec, 0, None)? == EnqueueOutcome::Admitted {
                recovered += 1;
            }
        }

        tracing::info!(recovered, "Task queue recovered from journal");
        Ok(recovered)
    }

    fn admit(
        &self,
        spec: TaskSpec,
        attempt: u32,
        last_error: Option<String>,
    ) -> Result<EnqueueOutcome> {
        let not_before_ms = self.time.now_ms().saturating_add(spec.delay_ms);

        let entry = {
            let mut state = self.state.lock().expect("queue lock poisoned");

            if state.pending_fingerprints.contains(&spec.fingerprint)
                || state.in_flight.contains(&spec.fingerprint)
            {
                return Ok(EnqueueOutcome::Coalesced);
            }

            if state.pending.len() >= self.capacity {
                return Err(Error::store_unavailable(format!(
                    "task queue full: {} tasks (limit: {})",
                    state.pending.len(),
                    self.capacity
                )));
            }

            state.pending_fingerprints.insert(spec.fingerprint.clone());
            state.pending.push_back(QueuedTask {
                spec: spec.clone(),
                attempt,
                last_error,
                not_before_ms,
            });

            debug_assert!(state.pending.len() <= self.capacity);
            // Journal first attempts only; retries recover as the original.
            (attempt == 0).then(|| JournalEntry::Enqueued { spec })
        };

        if let (Some(journal), Some(entry)) = (&self.journal, entry) {
            journal.append(&entry)?;
        }

        self.notify.notify_one();
        Ok(EnqueueOutcome::Admitted)
    }

    /// Re-admit a failed task for another attempt
    pub fn requeue(&self, spec: TaskSpec, attempt: u32, last_error: String) -> Result<()> {
        assert!(attempt > 0, "requeue is for retries only");
        self.release(&spec.fingerprint);
        self.admit(spec, attempt, Some(last_error))?;
        Ok(())
    }

    /// Pop the next task whose delay has elapsed
    ///
    /// Returns `None` when nothing is ready; the caller waits on
    /// [`TaskQueue::ready`].
    pub fn pop_ready(&self) -> Option<QueuedTask> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        let now = self.time.now_ms();

        let position = state
            .pending
            .iter()
            .position(|task| task.not_before_ms <= now)?;

        let task = state.pending.remove(position)?;
        state.pending_fingerprints.remove(&task.spec.fingerprint);
        state.in_flight.insert(task.spec.fingerprint.clone());
        Some(task)
    }

    /// Wait until a task may be ready
    pub async fn ready(&self) {
        self.notify.notified().await;
    }

    /// Wake all waiting workers (used on shutdown)
    pub fn wake_all(&self) {
        self.notify.notify_waiters();
    }

    /// Mark a task complete, releasing its fingerprint
    pub fn complete(&self, fingerprint: &str) -> Result<()> {
        self.release(fingerprint);
        if let Some(ref journal) = self.journal {
            journal.append(&JournalEntry::Completed {
                fingerprint: fingerprint.to_string(),
            })?;
        }
        Ok(())
    }

    /// Mark a task terminally failed, releasing its fingerprint
    pub fn abandon(&self, fingerprint: &str, error: &str) -> Result<()> {
        self.release(fingerprint);
        if let Some(ref journal) = self.journal {
            journal.append(&JournalEntry::Abandoned {
                fingerprint: fingerprint.to_string(),
                error: error.to_string(),
            })?;
        }
        Ok(())
    }

    fn release(&self, fingerprint: &str) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.in_flight.remove(fingerprint);
    }

    /// Number of pending tasks
    pub fn pending_len(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").pending.len()
    }

    /// Number of in-flight tasks
    pub fn in_flight_len(&self) -> usize {
        self.state
            .lock()
            .expect("queue lock poisoned")
            .in_flight
            .len()
    }

    /// True when nothing is pending or in flight
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock().expect("queue lock poisoned");
        state.pending.is_empty() && state.in_flight.is_empty()
    }
}

impl TaskSink for TaskQueue {
    fn enqueue(&self, spec: TaskSpec) -> Result<bool> {
        Ok(self.admit(spec, 0, None)? == EnqueueOutcome::Admitted)
    }
}

impl TaskSink for Arc<TaskQueue> {
    fn enqueue(&self, spec: TaskSpec) -> Result<bool> {
        self.as_ref().enqueue(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::MemoryTaskJournal;
    use selkie_core::ManualClock;
    use serde_json::json;

    fn queue() -> TaskQueue {
        TaskQueue::new(100, Arc::new(ManualClock::new(0)))
    }

    #[test]
    fn test_enqueue_pop_complete() {
        let queue = queue();
        let spec = TaskSpec::new("compact", json!(null));

        assert!(queue.enqueue(spec.clone()).unwrap());
        assert_eq!(queue.pending_len(), 1);

        let task = queue.pop_ready().unwrap();
        assert_eq!(task.spec.name, "compact");
        assert_eq!(queue.in_flight_len(), 1);

        queue.complete(&task.spec.fingerprint).unwrap();
        assert!(queue.is_idle());
    }

    #[test]
    fn test_fingerprint_coalescing_while_pending() {
        let queue = queue();
        let spec = TaskSpec::new("promote_session", json!({"session": "s1"}));

        assert!(queue.enqueue(spec.clone()).unwrap());
        assert!(!queue.enqueue(spec.clone()).unwrap());
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn test_fingerprint_coalescing_while_in_flight() {
        let queue = queue();
        let spec = TaskSpec::new("promote_session", json!({"session": "s1"}));

        queue.enqueue(spec.clone()).unwrap();
        let task = queue.pop_ready().unwrap();

        // Still running: duplicate coalesces.
        assert!(!queue.enqueue(spec.clone()).unwrap());

        // Completed: same work may run again.
        queue.complete(&task.spec.fingerprint).unwrap();
        assert!(queue.enqueue(spec).unwrap());
    }

    #[test]
    fn test_different_fingerprints_coexist() {
        let queue = queue();
        assert!(queue
            .enqueue(TaskSpec::new("promote_session", json!({"session": "s1"})))
            .unwrap());
        assert!(queue
            .enqueue(TaskSpec::new("promote_session", json!({"session": "s2"})))
            .unwrap());
        assert_eq!(queue.pending_len(), 2);
    }

    #[test]
    fn test_capacity_enforced() {
        let time: Arc<dyn TimeProvider> = Arc::new(ManualClock::new(0));
        let queue = TaskQueue::new(2, time);

        queue.enqueue(TaskSpec::new("t", json!(1))).unwrap();
        queue.enqueue(TaskSpec::new("t", json!(2))).unwrap();
        let err = queue.enqueue(TaskSpec::new("t", json!(3))).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }));
    }

    #[test]
    fn test_delay_holds_task_back() {
        let clock = Arc::new(ManualClock::new(0));
        let queue = TaskQueue::new(10, clock.clone());

        queue
            .enqueue(TaskSpec::new("forget", json!(null)).with_delay_ms(1000))
            .unwrap();

        assert!(queue.pop_ready().is_none());
        clock.advance_ms(1000);
        assert!(queue.pop_ready().is_some());
    }

    #[test]
    fn test_fifo_order() {
        let queue = queue();
        for i in 0..3 {
            queue.enqueue(TaskSpec::new("t", json!(i))).unwrap();
        }
        for i in 0..3 {
            let task = queue.pop_ready().unwrap();
            assert_eq!(task.spec.args, json!(i));
            queue.complete(&task.spec.fingerprint).unwrap();
        }
    }

    #[test]
    fn test_requeue_preserves_attempt_count() {
        let queue = queue();
        let spec = TaskSpec::new("embed", json!({"batch": 1}));

        queue.enqueue(spec.clone()).unwrap();
        let task = queue.pop_ready().unwrap();
        queue
            .requeue(task.spec.clone(), task.attempt + 1, "transient".into())
            .unwrap();

        let retried = queue.pop_ready().unwrap();
        assert_eq!(retried.attempt, 1);
        assert_eq!(retried.last_error.as_deref(), Some("transient"));
    }

    #[test]
    fn test_recovery_replays_incomplete_work() {
        let journal = Arc::new(MemoryTaskJournal::new());
        let time: Arc<dyn TimeProvider> = Arc::new(ManualClock::new(0));

        {
            let queue = TaskQueue::new(10, time.clone()).with_journal(journal.clone());
            queue
                .enqueue(TaskSpec::new("promote_session", json!({"session": "s1"})))
                .unwrap();
            queue
                .enqueue(TaskSpec::new("promote_session", json!({"session": "s2"})))
                .unwrap();

            // s1 completes before the crash; s2 does not.
            let task = queue.pop_ready().unwrap();
            queue.complete(&task.spec.fingerprint).unwrap();
        }

        let restarted = TaskQueue::new(10, time).with_journal(journal);
        let recovered = restarted.recover().unwrap();
        assert_eq!(recovered, 1);

        let task = restarted.pop_ready().unwrap();
        assert_eq!(task.spec.args, json!({"session": "s2"}));
    }

    #[test]
    fn test_abandoned_tasks_do_not_recover() {
        let journal = Arc::new(MemoryTaskJournal::new());
        let time: Arc<dyn TimeProvider> = Arc::new(ManualClock::new(0));

        {
            let queue = TaskQueue::new(10, time.clone()).with_journal(journal.clone());
            queue
                .enqueue(TaskSpec::new("embed", json!({"batch": 9})))
                .unwrap();
            let task = queue.pop_ready().unwrap();
            queue.abandon(&task.spec.fingerprint, "poisoned").unwrap();
        }

        let restarted = TaskQueue::new(10, time).with_journal(journal);
        assert_eq!(restarted.recover().unwrap(), 0);
    }
}
