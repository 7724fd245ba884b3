//! Memory prompt hydration
//!
//! TigerStyle: Deterministic message order, no truncation surprises.
//!
//! Hydrates a user query with memory context: the session's running summary
//! (if any) as a system message, the session messages in order, one system
//! message listing relevant long-term memories, and the query itself as the
//! final user message. Clients own context-length management.

use serde::{Deserialize, Serialize};

use selkie_core::{MessageRole, RequestContext, Result, SessionKey};

use crate::search::{QueryService, SearchRequest};

/// A message in a hydrated prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydratedMessage {
    /// Message role
    pub role: MessageRole,
    /// Message text
    pub content: String,
}

impl HydratedMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// A memory-prompt request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryPromptRequest {
    /// The user query to hydrate
    pub query: String,
    /// Session whose working memory prefixes the prompt
    #[serde(default)]
    pub session: Option<SessionKey>,
    /// Cap on session messages included, most recent first
    #[serde(default)]
    pub recent_messages_limit: Option<usize>,
    /// Long-term search run with the query text
    #[serde(default)]
    pub search: Option<SearchRequest>,
}

impl QueryService {
    /// Hydrate a query with working and long-term memory context
    pub async fn memory_prompt(
        &self,
        request: MemoryPromptRequest,
        ctx: &RequestContext,
    ) -> Result<Vec<HydratedMessage>> {
        ctx.check_deadline("memory_prompt")?;
        let mut messages: Vec<HydratedMessage> = Vec::new();

        if let Some(ref session) = request.session {
            if let Some(wm) = self
                .working
                .get(session, request.recent_messages_limit)
                .await?
            {
                if let Some(ref context) = wm.context {
                    messages.push(HydratedMessage::system(format!(
                        "## A summary of the conversation so far:\n{}",
                        context
                    )));
                }
                for message in &wm.messages {
                    messages.push(HydratedMessage {
                        role: message.role,
                        content: message.content.clone(),
                    });
                }
            }
        }

        if let Some(mut search) = request.search {
            if search.text.is_none() {
                search.text = Some(request.query.clone());
            }
            let results = self.search(search, ctx).await?;
            if !results.memories.is_empty() {
                let bullets = results
                    .memories
                    .iter()
                    .map(|m| format!("- {}", m.record.text))
                    .collect::<Vec<_>>()
                    .join("\n");
                messages.push(HydratedMessage::system(format!(
                    "Relevant memories:\n{}",
                    bullets
                )));
            }
        }

        messages.push(HydratedMessage::user(request.query));
        Ok(messages)
    }
}
