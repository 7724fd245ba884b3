//! Token counting
//!
//! TigerStyle: Pluggable counter, deterministic fallback.
//!
//! The summarization trigger compares a session's token estimate against the
//! context window. Real tokenizers are model-specific and pluggable; the
//! fallback is a fixed heuristic (`max(ceil(chars / 4), words)`) so threshold
//! behaviour is reproducible whatever models are configured.

use selkie_core::MemoryMessage;

/// Pluggable token counter indexed by model name
pub trait TokenCounter: Send + Sync {
    /// Identifier of the tokenizer, for logs
    fn name(&self) -> &str;

    /// Count tokens in a text
    fn count(&self, text: &str) -> u32;
}

/// Deterministic character/word heuristic
///
/// `max(ceil(chars / 4), words)` approximates BPE tokenizers closely enough
/// for a trigger threshold and needs no model files.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn name(&self) -> &str {
        "heuristic-chars4"
    }

    fn count(&self, text: &str) -> u32 {
        let chars = text.chars().count();
        let words = text.split_whitespace().count();
        let by_chars = chars.div_ceil(4);
        by_chars.max(words) as u32
    }
}

/// Estimate tokens across messages and an optional running context
pub fn estimate_tokens(
    counter: &dyn TokenCounter,
    messages: &[MemoryMessage],
    context: Option<&str>,
) -> u32 {
    let message_tokens: u32 = messages.iter().map(|m| counter.count(&m.render())).sum();
    let context_tokens = context.map(|c| counter.count(c)).unwrap_or(0);
    message_tokens.saturating_add(context_tokens)
}
