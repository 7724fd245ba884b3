//! Long-term memory records
//!
//! TigerStyle: Immutable identity, enrichment-owned mutations only.
//!
//! After `persisted_at` is set, `id`, `text`, `memory_type`, `hash`, and
//! `created_at` never change. Enrichment owns `vector`, `topics`, `entities`,
//! `last_accessed_at`, `access_count`, and `superseded_by`; every mutation
//! flows through an [`EnrichmentPatch`] so stores can enforce the split.

use serde::{Deserialize, Serialize};

use crate::constants::MEMORY_TEXT_LENGTH_BYTES_MAX;
use crate::error::{Error, Result};
use crate::ids::MemoryId;

/// Coarse category of a long-term memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Fact or preference, not bound to a point in time
    Semantic,
    /// Event with a domain timestamp
    Episodic,
    /// Raw conversation message
    Message,
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Semantic => "semantic",
            Self::Episodic => "episodic",
            Self::Message => "message",
        })
    }
}

/// A long-term memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Globally unique, monotonic identifier
    pub id: MemoryId,
    /// Canonical content
    pub text: String,
    /// Memory category
    pub memory_type: MemoryType,
    /// Topics (enrichment-owned)
    #[serde(default)]
    pub topics: Vec<String>,
    /// Entities (enrichment-owned)
    #[serde(default)]
    pub entities: Vec<String>,
    /// Namespace scope
    #[serde(default)]
    pub namespace: Option<String>,
    /// User scope
    #[serde(default)]
    pub user_id: Option<String>,
    /// Session that produced the record
    #[serde(default)]
    pub session_id: Option<String>,
    /// Domain timestamp for episodic records, epoch milliseconds
    #[serde(default)]
    pub event_date: Option<u64>,
    /// Creation time, epoch milliseconds
    pub created_at: u64,
    /// Last access time, epoch milliseconds (enrichment-owned)
    pub last_accessed_at: u64,
    /// Access counter (enrichment-owned)
    #[serde(default)]
    pub access_count: u64,
    /// Set exactly once when the record enters the long-term store
    #[serde(default)]
    pub persisted_at: Option<u64>,
    /// Deterministic content+identity hash
    pub hash: String,
    /// Embedding (enrichment-owned; absent until embedded)
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    /// Id of the record that replaces this one (enrichment-owned)
    #[serde(default)]
    pub superseded_by: Option<MemoryId>,
    /// Ids of the source messages or records that produced this record
    #[serde(default)]
    pub discrete_source_ids: Vec<MemoryId>,
    /// Set when enrichment gave up on this record after retries
    #[serde(default)]
    pub enrichment_failed: bool,
}

impl MemoryRecord {
    /// Create a staged (not yet persisted) record
    ///
    /// The hash is left empty; the long-term store owns its computation.
    pub fn new(
        id: MemoryId,
        text: impl Into<String>,
        memory_type: MemoryType,
        created_at: u64,
    ) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::input_invalid("text", "must not be empty"));
        }
        if text.len() > MEMORY_TEXT_LENGTH_BYTES_MAX {
            return Err(Error::input_invalid(
                "text",
                format!(
                    "{} bytes exceeds limit of {} bytes",
                    text.len(),
                    MEMORY_TEXT_LENGTH_BYTES_MAX
                ),
            ));
        }
        Ok(Self {
            id,
            text,
            memory_type,
            topics: Vec::new(),
            entities: Vec::new(),
            namespace: None,
            user_id: None,
            session_id: None,
            event_date: None,
            created_at,
            last_accessed_at: created_at,
            access_count: 0,
            persisted_at: None,
            hash: String::new(),
            vector: None,
            superseded_by: None,
            discrete_source_ids: Vec::new(),
            enrichment_failed: false,
        })
    }

    /// Set the namespace scope
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the user scope
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the originating session
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the domain timestamp
    pub fn with_event_date(mut self, event_date_ms: u64) -> Self {
        self.event_date = Some(event_date_ms);
        self
    }

    /// Set the source ids this record was extracted from
    pub fn with_source_ids(mut self, ids: Vec<MemoryId>) -> Self {
        self.discrete_source_ids = ids;
        self
    }

    /// True once the record has entered the long-term store
    pub fn is_persisted(&self) -> bool {
        self.persisted_at.is_some()
    }

    /// True when a newer record replaces this one
    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }

    /// True when the record should appear in search results
    pub fn is_searchable(&self) -> bool {
        self.is_persisted() && !self.is_superseded()
    }
}

/// Partial update restricted to enrichment-owned fields
///
/// All fields use write-if-absent-or-changed semantics so a re-run stage is
/// a no-op. `access_count_add` is a delta, merged server-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_count_add: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<MemoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_failed: Option<bool>,
}

impl EnrichmentPatch {
    /// Patch that attaches an embedding
    pub fn vector(vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
            ..Default::default()
        }
    }

    /// Patch that attaches topics
    pub fn topics(topics: Vec<String>) -> Self {
        Self {
            topics: Some(topics),
            ..Default::default()
        }
    }

    /// Patch that attaches entities
    pub fn entities(entities: Vec<String>) -> Self {
        Self {
            entities: Some(entities),
            ..Default::default()
        }
    }

    /// Patch that records an access
    pub fn touch(now_ms: u64) -> Self {
        Self {
            last_accessed_at: Some(now_ms),
            access_count_add: Some(1),
            ..Default::default()
        }
    }

    /// Patch that marks supersession
    pub fn supersede(by: MemoryId) -> Self {
        Self {
            superseded_by: Some(by),
            ..Default::default()
        }
    }

    /// True when the patch carries no changes
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch to a record, returning whether anything changed
    ///
    /// Only enrichment-owned fields are touched; identity fields cannot be
    /// altered through a patch by construction.
    pub fn apply(&self, record: &mut MemoryRecord) -> bool {
        let mut changed = false;

        if let Some(ref vector) = self.vector {
            if record.vector.as_ref() != Some(vector) {
                record.vector = Some(vector.clone());
                changed = true;
            }
        }
        if let Some(ref topics) = self.topics {
            if &record.topics != topics {
                record.topics = topics.clone();
                changed = true;
            }
        }
        if let Some(ref entities) = self.entities {
            if &record.entities != entities {
                record.entities = entities.clone();
                changed = true;
            }
        }
        if let Some(last_accessed_at) = self.last_accessed_at {
            if record.last_accessed_at < last_accessed_at {
                record.last_accessed_at = last_accessed_at;
                changed = true;
            }
        }
        if let Some(delta) = self.access_count_add {
            if delta > 0 {
                record.access_count = record.access_count.saturating_add(delta);
                changed = true;
            }
        }
        if let Some(superseded_by) = self.superseded_by {
            if record.superseded_by != Some(superseded_by) {
                record.superseded_by = Some(superseded_by);
                changed = true;
            }
        }
        if let Some(failed) = self.enrichment_failed {
            if record.enrichment_failed != failed {
                record.enrichment_failed = failed;
                changed = true;
            }
        }

        changed
    }
}
