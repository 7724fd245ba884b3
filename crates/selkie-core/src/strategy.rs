//! Extraction strategy descriptors
//!
//! TigerStyle: Closed sum type plus one validated custom variant.
//!
//! Each working memory session carries the strategy the promotion pipeline
//! applies to it. The descriptor is plain data; the pipeline owns the
//! behaviour behind each variant.

use serde::{Deserialize, Serialize};

/// How memories are extracted from a session's messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Produce atomic facts and preferences as semantic records
    #[default]
    Discrete,
    /// Produce one episodic record summarizing the segment
    Summary,
    /// Produce records restricted to first-person user traits
    Preferences,
    /// Run a caller-provided prompt; must pass the security validator
    Custom {
        /// Prompt template; `{messages}` is replaced with the segment text
        prompt: String,
    },
}

impl ExtractionStrategy {
    /// Stable name used in logs and task arguments
    pub fn name(&self) -> &'static str {
        match self {
            Self::Discrete => "discrete",
            Self::Summary => "summary",
            Self::Preferences => "preferences",
            Self::Custom { .. } => "custom",
        }
    }
}
