//! Request context
//!
//! TigerStyle: Explicit context values instead of ambient globals.
//!
//! Every core operation takes a [`RequestContext`] carrying the request id,
//! the deadline, and the time provider. Background tasks synthesize their own
//! context from the task runtime's ceiling.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::io::{TimeProvider, WallClockTime};

/// Immutable per-operation context
#[derive(Clone)]
pub struct RequestContext {
    /// Request identifier, carried into logs
    request_id: Uuid,
    /// Absolute deadline in epoch milliseconds, if any
    deadline_ms: Option<u64>,
    /// Time provider for deadline checks
    time: Arc<dyn TimeProvider>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("deadline_ms", &self.deadline_ms)
            .finish()
    }
}

impl RequestContext {
    /// Create a context with no deadline, using the wall clock
    pub fn new() -> Self {
        Self::with_time(Arc::new(WallClockTime::new()))
    }

    /// Create a context over a specific time provider
    pub fn with_time(time: Arc<dyn TimeProvider>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            deadline_ms: None,
            time,
        }
    }

    /// Derive a context with an absolute deadline
    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    /// Derive a context whose deadline is `timeout_ms` from now
    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        let deadline = self.time.now_ms().saturating_add(timeout_ms);
        self.with_deadline_ms(deadline)
    }

    /// Request identifier
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Time provider
    pub fn time(&self) -> &Arc<dyn TimeProvider> {
        &self.time
    }

    /// Current time in epoch milliseconds
    pub fn now_ms(&self) -> u64 {
        self.time.now_ms()
    }

    /// Milliseconds until the deadline, `None` when no deadline is set
    pub fn remaining_ms(&self) -> Option<u64> {
        self.deadline_ms
            .map(|deadline| deadline.saturating_sub(self.time.now_ms()))
    }

    /// Fail with [`Error::DeadlineExceeded`] when the deadline has passed
    pub fn check_deadline(&self, operation: &str) -> Result<()> {
        if let Some(deadline) = self.deadline_ms {
            let now = self.time.now_ms();
            if now >= deadline {
                return Err(Error::DeadlineExceeded {
                    operation: operation.to_string(),
                    elapsed_ms: now.saturating_sub(deadline),
                });
            }
        }
        Ok(())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
