//! Session summarization
//!
//! TigerStyle: Explicit char targets, epoch-guarded, incremental.
//!
//! When a session's token estimate crosses the threshold, this stage folds
//! older messages into the running summary and keeps only the most recent
//! ones verbatim. The epoch carried in the task arguments guards against
//! stale runs: if the session has already summarized past that epoch, the
//! task is a no-op.

use tracing::{debug, info};

use selkie_core::{RequestContext, Result, SessionKey};

use crate::pipeline::Pipeline;

/// Target length of a produced summary in characters
const SUMMARY_LENGTH_CHARS_TARGET: usize = 500;

/// Prompt template for incremental summarization
const SUMMARIZE_PROMPT: &str = r#"Condense the conversation below into a running summary of at most {target_chars} characters. Fold the previous summary in; keep key facts, decisions, and open questions.

Previous summary:
{previous}

New messages:
{messages}

Updated summary:"#;

/// Summarize a session if the epoch still matches
///
/// Returns `true` when a summary was produced and the working memory
/// updated.
pub async fn summarize_session(
    pipeline: &Pipeline,
    session: &SessionKey,
    epoch: u64,
    ctx: &RequestContext,
) -> Result<bool> {
    let Some(wm) = pipeline.working.get(session, None).await? else {
        return Ok(false);
    };

    if wm.summarization_epoch != epoch {
        debug!(
            session = %session.storage_key(),
            requested = epoch,
            current = wm.summarization_epoch,
            "Stale summarization task skipped"
        );
        return Ok(false);
    }

    let keep = pipeline.config.summarization.keep_recent_messages;
    if wm.messages.len() <= keep {
        return Ok(false);
    }
    ctx.check_deadline("summarize_session")?;

    let split = wm.messages.len() - keep;
    let (to_fold, to_keep) = wm.messages.split_at(split);

    let rendered: Vec<String> = to_fold.iter().map(|m| m.render()).collect();
    let prompt = SUMMARIZE_PROMPT
        .replace("{target_chars}", &SUMMARY_LENGTH_CHARS_TARGET.to_string())
        .replace("{previous}", wm.context.as_deref().unwrap_or("(none)"))
        .replace("{messages}", &rendered.join("\n"));

    let summary = pipeline
        .generation
        .generate(
            &prompt,
            &pipeline.config.embedding.generation_model_slow,
            1024,
        )
        .await?;

    let mut updated = wm.clone();
    updated.context = Some(summary.trim().to_string());
    updated.messages = to_keep.to_vec();
    pipeline.working.set(updated).await?;
    pipeline.working.bump_summarization_epoch(session).await?;

    info!(
        session = %session.storage_key(),
        folded = to_fold.len(),
        kept = keep,
        "Session summarized"
    );
    Ok(true)
}
