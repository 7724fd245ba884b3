//! Extraction strategies
//!
//! TigerStyle: One extraction surface, closed strategy set.
//!
//! Every strategy turns a segment of conversation messages into candidate
//! memories. Discrete and preference extraction ask the slow model for a
//! JSON payload; summary extraction produces one episodic record from a
//! free-text summary; custom strategies run a validated caller template.

use serde::{Deserialize, Serialize};
use tracing::warn;

use selkie_core::{
    Error, ExtractionStrategy, MemoryMessage, MemoryType, RequestContext, Result,
};
use selkie_llm::GenerationProvider;

use crate::validator::{validate_custom_prompt, MESSAGES_PLACEHOLDER};

/// Prompt for discrete fact/preference extraction
///
/// The model returns `{"memories": [{type, text, topics, entities}]}`.
const DISCRETE_EXTRACTION_PROMPT: &str = r#"You are a long-memory manager. Analyze the conversation below and extract
information that will be useful in future conversations with this user.

Extract two types of memories:
1. "episodic": personal experiences specific to the user or agent,
   e.g. "User had a bad experience in Paris".
2. "semantic": user preferences and general knowledge outside your training
   data, e.g. "User prefers window seats".

Return JSON of the form:
{"memories": [{"type": "semantic", "text": "...", "topics": ["..."], "entities": ["..."]}]}

Rules:
- Only extract information genuinely useful for future interactions.
- Do not extract procedural knowledge.
- Attach at most {top_k_topics} topics per memory.

Conversation:
{messages}

Extracted memories:"#;

/// Prompt for first-person preference extraction
const PREFERENCES_EXTRACTION_PROMPT: &str = r#"You are a long-memory manager. From the conversation below, extract only
first-person traits and preferences of the user: likes, dislikes, habits,
constraints, and stated goals. Ignore facts about the world and about third
parties.

Return JSON of the form:
{"memories": [{"type": "semantic", "text": "...", "topics": ["..."], "entities": ["..."]}]}

Attach at most {top_k_topics} topics per memory.

Conversation:
{messages}

Extracted preferences:"#;

/// Prompt for segment summarization into one episodic record
const SUMMARY_EXTRACTION_PROMPT: &str = r#"Summarize the following conversation segment in at most 500 characters.
Focus on key topics, decisions, and outcomes. Respond with the summary text
only.

Conversation:
{messages}

Summary:"#;

/// One memory produced by an extraction strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMemory {
    /// Memory category; unknown strings fall back to episodic
    #[serde(default = "default_memory_kind")]
    pub r#type: String,
    /// The content to store
    pub text: String,
    /// Topic labels proposed by the model
    #[serde(default)]
    pub topics: Vec<String>,
    /// Entity labels proposed by the model
    #[serde(default)]
    pub entities: Vec<String>,
}

fn default_memory_kind() -> String {
    "episodic".to_string()
}

impl ExtractedMemory {
    /// Map the model's type string onto the record category
    pub fn memory_type(&self) -> MemoryType {
        match self.r#type.as_str() {
            "semantic" => MemoryType::Semantic,
            _ => MemoryType::Episodic,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExtractionPayload {
    memories: Vec<ExtractedMemory>,
}

/// Render the messages segment fed to extraction prompts
pub fn render_segment(messages: &[MemoryMessage]) -> String {
    messages
        .iter()
        .map(MemoryMessage::render)
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_prompt(strategy: &ExtractionStrategy, segment: &str, top_k_topics: usize) -> Result<String> {
    let template = match strategy {
        ExtractionStrategy::Discrete => DISCRETE_EXTRACTION_PROMPT,
        ExtractionStrategy::Preferences => PREFERENCES_EXTRACTION_PROMPT,
        ExtractionStrategy::Summary => SUMMARY_EXTRACTION_PROMPT,
        ExtractionStrategy::Custom { prompt } => {
            validate_custom_prompt(prompt)?;
            prompt.as_str()
        }
    };

    Ok(template
        .replace(MESSAGES_PLACEHOLDER, segment)
        .replace("{top_k_topics}", &top_k_topics.to_string()))
}

fn parse_extraction(response: &str) -> Result<Vec<ExtractedMemory>> {
    let payload: ExtractionPayload = serde_json::from_str(response).map_err(|e| {
        Error::provider_failure("extraction", format!("malformed extraction JSON: {}", e))
    })?;

    Ok(payload
        .memories
        .into_iter()
        .filter(|m| !m.text.trim().is_empty())
        .collect())
}

/// Run a strategy over a message segment
///
/// Returns candidate memories; an empty segment extracts nothing without a
/// provider call.
pub async fn extract_candidates(
    strategy: &ExtractionStrategy,
    messages: &[MemoryMessage],
    generation: &dyn GenerationProvider,
    model: &str,
    top_k_topics: usize,
    ctx: &RequestContext,
) -> Result<Vec<ExtractedMemory>> {
    if messages.is_empty() {
        return Ok(Vec::new());
    }
    ctx.check_deadline("extract_candidates")?;

    let segment = render_segment(messages);
    let prompt = build_prompt(strategy, &segment, top_k_topics)?;
    let response = generation.generate(&prompt, model, 2048).await?;

    match strategy {
        ExtractionStrategy::Summary => Ok(vec![ExtractedMemory {
            r#type: "episodic".to_string(),
            text: response.trim().to_string(),
            topics: Vec::new(),
            entities: Vec::new(),
        }]),
        _ => {
            let memories = parse_extraction(&response)?;
            if memories.is_empty() {
                warn!(strategy = strategy.name(), "Extraction produced no memories");
            }
            Ok(memories)
        }
    }
}
