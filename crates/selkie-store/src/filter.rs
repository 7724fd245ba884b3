//! Filter expressions for memory search
//!
//! TigerStyle: Tagged variants per field type, one evaluation point.
//!
//! Filters arrive from clients as per-field operator objects
//! (`{eq, ne, any_of, none_of}` for tag fields, `{gt, gte, lt, lte, between}`
//! for timestamp fields). [`Filters::matches`] is the single place filter
//! semantics are defined; backends may push expressions down to their native
//! query language but must agree with it.

use serde::{Deserialize, Serialize};

use selkie_core::{Error, MemoryRecord, MemoryType, Result};

/// Operator filter over a string-valued field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ne: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub none_of: Option<Vec<String>>,
}

impl TagFilter {
    /// Filter for exact equality
    pub fn eq(value: impl Into<String>) -> Self {
        Self {
            eq: Some(value.into()),
            ..Default::default()
        }
    }

    /// Filter accepting any of the given values
    pub fn any_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            any_of: Some(values.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Evaluate against a single optional value (scalar fields)
    fn matches_scalar(&self, value: Option<&str>) -> bool {
        if let Some(ref expected) = self.eq {
            if value != Some(expected.as_str()) {
                return false;
            }
        }
        if let Some(ref rejected) = self.ne {
            if value == Some(rejected.as_str()) {
                return false;
            }
        }
        if let Some(ref allowed) = self.any_of {
            match value {
                Some(v) if allowed.iter().any(|a| a == v) => {}
                _ => return false,
            }
        }
        if let Some(ref denied) = self.none_of {
            if let Some(v) = value {
                if denied.iter().any(|d| d == v) {
                    return false;
                }
            }
        }
        true
    }

    /// Evaluate against a set-valued field (topics, entities)
    ///
    /// `eq`/`any_of` require at least one member to match; `ne`/`none_of`
    /// require that no member matches.
    fn matches_set(&self, values: &[String]) -> bool {
        if let Some(ref expected) = self.eq {
            if !values.iter().any(|v| v == expected) {
                return false;
            }
        }
        if let Some(ref rejected) = self.ne {
            if values.iter().any(|v| v == rejected) {
                return false;
            }
        }
        if let Some(ref allowed) = self.any_of {
            if !values.iter().any(|v| allowed.iter().any(|a| a == v)) {
                return false;
            }
        }
        if let Some(ref denied) = self.none_of {
            if values.iter().any(|v| denied.iter().any(|d| d == v)) {
                return false;
            }
        }
        true
    }

    fn is_empty(&self) -> bool {
        self.eq.is_none() && self.ne.is_none() && self.any_of.is_none() && self.none_of.is_none()
    }
}

/// Operator filter over a timestamp field (epoch milliseconds)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub between: Option<(u64, u64)>,
}

impl RangeFilter {
    /// Filter accepting values at or after the given time
    pub fn gte(value: u64) -> Self {
        Self {
            gte: Some(value),
            ..Default::default()
        }
    }

    /// Filter accepting values strictly before the given time
    pub fn lt(value: u64) -> Self {
        Self {
            lt: Some(value),
            ..Default::default()
        }
    }

    /// Filter accepting values within the inclusive range
    pub fn between(low: u64, high: u64) -> Self {
        Self {
            between: Some((low, high)),
            ..Default::default()
        }
    }

    /// Validate operator consistency
    pub fn validate(&self, field: &str) -> Result<()> {
        if let Some((low, high)) = self.between {
            if low > high {
                return Err(Error::input_invalid(
                    field,
                    format!("between bounds inverted: {} > {}", low, high),
                ));
            }
        }
        Ok(())
    }

    fn matches(&self, value: Option<u64>) -> bool {
        let Some(v) = value else {
            // A range filter on an absent field never matches.
            return self.is_empty();
        };
        if let Some(eq) = self.eq {
            if v != eq {
                return false;
            }
        }
        if let Some(gt) = self.gt {
            if v <= gt {
                return false;
            }
        }
        if let Some(gte) = self.gte {
            if v < gte {
                return false;
            }
        }
        if let Some(lt) = self.lt {
            if v >= lt {
                return false;
            }
        }
        if let Some(lte) = self.lte {
            if v > lte {
                return false;
            }
        }
        if let Some((low, high)) = self.between {
            if v < low || v > high {
                return false;
            }
        }
        true
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Combined filter expression over the indexed record fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<TagFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<TagFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<TagFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<TagFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<TagFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<MemoryType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<RangeFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<RangeFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<RangeFilter>,
    /// Internal: exact-dedup lookup by content hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Filters {
    /// Filter scoped to one user
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(TagFilter::eq(user_id)),
            ..Default::default()
        }
    }

    /// Add a namespace equality constraint
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(TagFilter::eq(namespace));
        self
    }

    /// Add a session equality constraint
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(TagFilter::eq(session_id));
        self
    }

    /// Add a memory type constraint
    pub fn with_memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    /// Validate range operator consistency
    pub fn validate(&self) -> Result<()> {
        if let Some(ref filter) = self.created_at {
            filter.validate("created_at")?;
        }
        if let Some(ref filter) = self.last_accessed_at {
            filter.validate("last_accessed_at")?;
        }
        if let Some(ref filter) = self.event_date {
            filter.validate("event_date")?;
        }
        Ok(())
    }

    /// True when no constraint is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Evaluate the full expression against a record
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(ref filter) = self.namespace {
            if !filter.matches_scalar(record.namespace.as_deref()) {
                return false;
            }
        }
        if let Some(ref filter) = self.user_id {
            if !filter.matches_scalar(record.user_id.as_deref()) {
                return false;
            }
        }
        if let Some(ref filter) = self.session_id {
            if !filter.matches_scalar(record.session_id.as_deref()) {
                return false;
            }
        }
        if let Some(ref filter) = self.topics {
            if !filter.is_empty() && !filter.matches_set(&record.topics) {
                return false;
            }
        }
        if let Some(ref filter) = self.entities {
            if !filter.is_empty() && !filter.matches_set(&record.entities) {
                return false;
            }
        }
        if let Some(memory_type) = self.memory_type {
            if record.memory_type != memory_type {
                return false;
            }
        }
        if let Some(ref filter) = self.created_at {
            if !filter.matches(Some(record.created_at)) {
                return false;
            }
        }
        if let Some(ref filter) = self.last_accessed_at {
            if !filter.matches(Some(record.last_accessed_at)) {
                return false;
            }
        }
        if let Some(ref filter) = self.event_date {
            if !filter.matches(record.event_date) {
                return false;
            }
        }
        if let Some(ref hash) = self.hash {
            if &record.hash != hash {
                return false;
            }
        }
        true
    }
}
