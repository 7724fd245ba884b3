//! Working memory store
//!
//! TigerStyle: Per-key write serialization, explicit TTL, no hidden renewal.
//!
//! Working memory is the session-scoped tier: conversation messages, staged
//! memory records, an optional running summary, and agent scratch data. Every
//! write renews the TTL; expiry removes the whole entry atomically. Writes to
//! one key are serialized by an advisory async lock held only for the
//! critical section; reads never block on writers of other keys.
//!
//! When the token estimate crosses the configured fraction of the context
//! window, the store emits a `summarize_session` task whose fingerprint is
//! bound to the session's summarization epoch, so concurrent triggers
//! coalesce into one run.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use selkie_core::{
    Error, ExtractionStrategy, MemoryId, MemoryIdGenerator, MemoryMessage, MemoryRecord,
    MessageRole, Result, SessionKey, SummarizationConfig, TimeProvider,
    WORKING_MEMORY_MESSAGES_COUNT_MAX,
};
use selkie_runtime::{TaskSink, TaskSpec};

use crate::tokens::{estimate_tokens, TokenCounter};

/// Task name for threshold-triggered summarization
pub const SUMMARIZE_SESSION_TASK: &str = "summarize_session";

/// One session's working memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemory {
    /// Session identity
    pub session: SessionKey,
    /// Ordered conversation messages
    pub messages: Vec<MemoryMessage>,
    /// Staged memory records, not yet persisted long-term
    pub memories: Vec<MemoryRecord>,
    /// Running summary of earlier conversation
    pub context: Option<String>,
    /// Opaque agent scratch data
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Extraction strategy applied during promotion
    #[serde(default)]
    pub strategy: ExtractionStrategy,
    /// Lifetime from last write, in seconds
    pub ttl_secs: u64,
    /// Cached token estimate of messages plus context
    pub tokens_estimate: u32,
    /// Last write time, epoch milliseconds
    pub last_accessed_at: u64,
    /// Incremented per completed summarization; coalesces triggers
    #[serde(default)]
    pub summarization_epoch: u64,
}

impl WorkingMemory {
    /// Create an empty working memory for a session
    pub fn new(session: SessionKey, ttl_secs: u64, now_ms: u64) -> Self {
        Self {
            session,
            messages: Vec::new(),
            memories: Vec::new(),
            context: None,
            data: Map::new(),
            strategy: ExtractionStrategy::default(),
            ttl_secs,
            tokens_estimate: 0,
            last_accessed_at: now_ms,
            summarization_epoch: 0,
        }
    }

    /// True when the TTL has elapsed since the last write
    pub fn is_expired(&self, now_ms: u64) -> bool {
        if self.ttl_secs == 0 {
            return false;
        }
        now_ms >= self.last_accessed_at.saturating_add(self.ttl_secs * 1000)
    }
}

/// Session-scoped store of working memories
pub struct WorkingMemoryStore {
    entries: RwLock<HashMap<String, WorkingMemory>>,
    /// Advisory per-key write locks
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    ids: MemoryIdGenerator,
    time: Arc<dyn TimeProvider>,
    tokens: Arc<dyn TokenCounter>,
    summarization: SummarizationConfig,
    default_ttl_secs: u64,
    tasks: Option<Arc<dyn TaskSink>>,
}

impl WorkingMemoryStore {
    /// Create a store
    pub fn new(
        time: Arc<dyn TimeProvider>,
        tokens: Arc<dyn TokenCounter>,
        summarization: SummarizationConfig,
        default_ttl_secs: u64,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
            ids: MemoryIdGenerator::new(),
            time,
            tokens,
            summarization,
            default_ttl_secs,
            tasks: None,
        }
    }

    /// Attach a task sink; enables the summarization trigger
    pub fn with_task_sink(mut self, tasks: Arc<dyn TaskSink>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    async fn write_lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Fetch a session's working memory
    ///
    /// `recent_messages_limit` truncates to the most recent messages.
    /// Expired entries read as absent and are removed.
    pub async fn get(
        &self,
        session: &SessionKey,
        recent_messages_limit: Option<usize>,
    ) -> Result<Option<WorkingMemory>> {
        let key = session.storage_key();
        let now = self.time.now_ms();

        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => {
                    let mut copy = entry.clone();
                    if let Some(limit) = recent_messages_limit {
                        if copy.messages.len() > limit {
                            copy.messages = copy.messages.split_off(copy.messages.len() - limit);
                        }
                    }
                    return Ok(Some(copy));
                }
                Some(_) => {}
            }
        }

        // Expired: remove the whole entry atomically.
        let lock = self.write_lock_for(&key).await;
        let _guard = lock.lock().await;
        let mut entries = self.entries.write().await;
        if entries.get(&key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(&key);
            debug!(session = %key, "Expired working memory removed");
        }
        Ok(None)
    }

    /// Replace a session's working memory
    ///
    /// The store assigns `last_accessed_at` and recomputes the token
    /// estimate; the TTL renews from now.
    pub async fn set(&self, mut wm: WorkingMemory) -> Result<WorkingMemory> {
        if wm.messages.len() > WORKING_MEMORY_MESSAGES_COUNT_MAX {
            return Err(Error::input_invalid(
                "messages",
                format!(
                    "{} messages exceeds limit of {}",
                    wm.messages.len(),
                    WORKING_MEMORY_MESSAGES_COUNT_MAX
                ),
            ));
        }

        let key = wm.session.storage_key();
        let lock = self.write_lock_for(&key).await;
        let _guard = lock.lock().await;

        wm.last_accessed_at = self.time.now_ms();
        if wm.ttl_secs == 0 {
            wm.ttl_secs = self.default_ttl_secs;
        }
        // Staged records are never pre-persisted.
        for record in &mut wm.memories {
            record.persisted_at = None;
        }
        wm.tokens_estimate =
            estimate_tokens(self.tokens.as_ref(), &wm.messages, wm.context.as_deref());

        // Carry the epoch forward when replacing an existing entry.
        {
            let entries = self.entries.read().await;
            if let Some(existing) = entries.get(&key) {
                wm.summarization_epoch = wm.summarization_epoch.max(existing.summarization_epoch);
            }
        }

        let result = wm.clone();
        self.entries.write().await.insert(key, wm);
        self.maybe_trigger_summarization(&result);
        Ok(result)
    }

    /// Append messages atomically, creating the session lazily
    ///
    /// Returns the ids assigned to the appended messages, in order.
    pub async fn append_messages(
        &self,
        session: &SessionKey,
        messages: Vec<(MessageRole, String)>,
    ) -> Result<Vec<MemoryId>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let key = session.storage_key();
        let lock = self.write_lock_for(&key).await;
        let _guard = lock.lock().await;
        let now = self.time.now_ms();

        let mut entries = self.entries.write().await;
        if !entries.get(&key).is_some_and(|e| !e.is_expired(now)) {
            let fresh = WorkingMemory::new(session.clone(), self.default_ttl_secs, now);
            entries.insert(key.clone(), fresh);
        }
        let entry = entries.get_mut(&key).expect("entry just inserted");

        if entry.messages.len() + messages.len() > WORKING_MEMORY_MESSAGES_COUNT_MAX {
            return Err(Error::input_invalid(
                "messages",
                format!(
                    "append would exceed limit of {} messages",
                    WORKING_MEMORY_MESSAGES_COUNT_MAX
                ),
            ));
        }

        let mut new_ids = Vec::with_capacity(messages.len());
        for (role, content) in messages {
            let id = self.ids.next();
            entry
                .messages
                .push(MemoryMessage::new(id, role, content, now)?);
            new_ids.push(id);
        }

        entry.last_accessed_at = now;
        entry.tokens_estimate =
            estimate_tokens(self.tokens.as_ref(), &entry.messages, entry.context.as_deref());

        let snapshot = entry.clone();
        drop(entries);
        self.maybe_trigger_summarization(&snapshot);

        debug_assert!(new_ids.windows(2).all(|w| w[0] < w[1]));
        Ok(new_ids)
    }

    /// Stage memory records for later promotion
    ///
    /// Each record's `persisted_at` is cleared; promotion owns persistence.
    pub async fn stage_memories(
        &self,
        session: &SessionKey,
        records: Vec<MemoryRecord>,
    ) -> Result<()> {
        let key = session.storage_key();
        let lock = self.write_lock_for(&key).await;
        let _guard = lock.lock().await;
        let now = self.time.now_ms();

        let mut entries = self.entries.write().await;
        if !entries.get(&key).is_some_and(|e| !e.is_expired(now)) {
            let fresh = WorkingMemory::new(session.clone(), self.default_ttl_secs, now);
            entries.insert(key.clone(), fresh);
        }
        let entry = entries.get_mut(&key).expect("entry just inserted");

        for mut record in records {
            record.persisted_at = None;
            entry.memories.push(record);
        }
        entry.last_accessed_at = now;
        Ok(())
    }

    /// Remove staged records by id (after successful promotion)
    pub async fn remove_staged(&self, session: &SessionKey, ids: &[MemoryId]) -> Result<()> {
        let key = session.storage_key();
        let lock = self.write_lock_for(&key).await;
        let _guard = lock.lock().await;

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&key) {
            entry.memories.retain(|r| !ids.contains(&r.id));
        }
        Ok(())
    }

    /// Delete a session's working memory
    pub async fn delete(&self, session: &SessionKey) -> Result<bool> {
        let key = session.storage_key();
        let lock = self.write_lock_for(&key).await;
        let _guard = lock.lock().await;

        let removed = self.entries.write().await.remove(&key).is_some();
        self.write_locks.lock().await.remove(&key);
        Ok(removed)
    }

    /// List live sessions, optionally restricted to a namespace
    ///
    /// Returns the total count and one page of session keys, ordered by key.
    pub async fn list_sessions(
        &self,
        namespace: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(usize, Vec<SessionKey>)> {
        let now = self.time.now_ms();
        let entries = self.entries.read().await;

        let mut keys: Vec<&WorkingMemory> = entries
            .values()
            .filter(|wm| !wm.is_expired(now))
            .filter(|wm| match namespace {
                Some(ns) => wm.session.namespace.as_deref() == Some(ns),
                None => true,
            })
            .collect();
        keys.sort_by_key(|wm| wm.session.storage_key());

        let total = keys.len();
        let page = keys
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|wm| wm.session.clone())
            .collect();
        Ok((total, page))
    }

    /// Remove every expired entry; returns how many were evicted
    pub async fn evict_expired(&self) -> usize {
        let now = self.time.now_ms();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, wm| !wm.is_expired(now));
        before - entries.len()
    }

    /// Bump the summarization epoch after a completed run
    pub async fn bump_summarization_epoch(&self, session: &SessionKey) -> Result<u64> {
        let key = session.storage_key();
        let lock = self.write_lock_for(&key).await;
        let _guard = lock.lock().await;

        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&key)
            .ok_or_else(|| Error::not_found("session", key.clone()))?;
        entry.summarization_epoch += 1;
        Ok(entry.summarization_epoch)
    }

    fn maybe_trigger_summarization(&self, wm: &WorkingMemory) {
        let Some(ref tasks) = self.tasks else {
            return;
        };

        let budget = f64::from(self.summarization.context_window_max);
        let usage = f64::from(wm.tokens_estimate) / budget;
        if usage < self.summarization.summarization_threshold {
            return;
        }

        let key = wm.session.storage_key();
        let spec = TaskSpec::with_fingerprint(
            SUMMARIZE_SESSION_TASK,
            json!({
                "namespace": wm.session.namespace,
                "user_id": wm.session.user_id,
                "session_id": wm.session.session_id,
                "epoch": wm.summarization_epoch,
            }),
            format!("{}:{}:{}", SUMMARIZE_SESSION_TASK, key, wm.summarization_epoch),
        );

        match tasks.enqueue(spec) {
            Ok(true) => debug!(session = %key, tokens = wm.tokens_estimate, "Summarization triggered"),
            Ok(false) => {}
            Err(err) => tracing::warn!(session = %key, error = %err, "Summarization enqueue failed"),
        }
    }
}
