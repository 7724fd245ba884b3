//! Background task handlers
//!
//! TigerStyle: Stable names, versioned argument shapes, thin glue.
//!
//! Each pipeline stage registers under a stable task name. Handlers parse
//! their JSON arguments, call the stage, and translate nothing else: the
//! stages own the semantics.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use selkie_core::{Error, MemoryId, RequestContext, Result, SessionKey};
use selkie_memory::SUMMARIZE_SESSION_TASK;
use selkie_runtime::{HandlerRegistry, TaskHandler};

use crate::compact::compact;
use crate::forget::forget;
use crate::pipeline::Pipeline;
use crate::summarize::summarize_session;

/// Task name for session promotion
pub const PROMOTE_SESSION_TASK: &str = "promote_session";

/// Task name for periodic compaction
pub const COMPACT_TASK: &str = "compact";

/// Task name for periodic forgetting
pub const FORGET_TASK: &str = "forget";

/// Task name for batched access touches
pub const TOUCH_TASK: &str = "touch_records";

/// Session-addressed task arguments
#[derive(Debug, Deserialize)]
struct SessionArgs {
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    session_id: String,
    #[serde(default)]
    epoch: u64,
}

impl SessionArgs {
    fn parse(args: &Value) -> Result<Self> {
        serde_json::from_value(args.clone())
            .map_err(|e| Error::input_invalid("task args", e.to_string()))
    }

    fn session_key(&self) -> Result<SessionKey> {
        SessionKey::new(
            self.namespace.clone(),
            self.user_id.clone(),
            self.session_id.clone(),
        )
    }
}

struct PromoteSessionHandler {
    pipeline: Arc<Pipeline>,
}

#[async_trait]
impl TaskHandler for PromoteSessionHandler {
    async fn handle(&self, args: Value, ctx: &RequestContext) -> Result<()> {
        let args = SessionArgs::parse(&args)?;
        self.pipeline
            .promote_session(&args.session_key()?, ctx)
            .await?;
        Ok(())
    }
}

struct SummarizeSessionHandler {
    pipeline: Arc<Pipeline>,
}

#[async_trait]
impl TaskHandler for SummarizeSessionHandler {
    async fn handle(&self, args: Value, ctx: &RequestContext) -> Result<()> {
        let args = SessionArgs::parse(&args)?;
        summarize_session(&self.pipeline, &args.session_key()?, args.epoch, ctx).await?;
        Ok(())
    }
}

struct CompactHandler {
    pipeline: Arc<Pipeline>,
}

#[async_trait]
impl TaskHandler for CompactHandler {
    async fn handle(&self, _args: Value, ctx: &RequestContext) -> Result<()> {
        compact(&self.pipeline, ctx).await?;
        Ok(())
    }
}

struct ForgetHandler {
    pipeline: Arc<Pipeline>,
}

#[async_trait]
impl TaskHandler for ForgetHandler {
    async fn handle(&self, _args: Value, ctx: &RequestContext) -> Result<()> {
        forget(&self.pipeline, ctx).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TouchArgs {
    ids: Vec<String>,
}

struct TouchHandler {
    pipeline: Arc<Pipeline>,
}

#[async_trait]
impl TaskHandler for TouchHandler {
    async fn handle(&self, args: Value, _ctx: &RequestContext) -> Result<()> {
        let args: TouchArgs = serde_json::from_value(args)
            .map_err(|e| Error::input_invalid("task args", e.to_string()))?;

        let ids: Vec<MemoryId> = args
            .ids
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .collect();
        self.pipeline.long_term.touch(&ids).await?;
        Ok(())
    }
}

/// Register every pipeline task on the given registry
pub fn register_handlers(registry: &mut HandlerRegistry, pipeline: Arc<Pipeline>) {
    registry.register(
        PROMOTE_SESSION_TASK,
        Arc::new(PromoteSessionHandler {
            pipeline: Arc::clone(&pipeline),
        }),
    );
    registry.register(
        SUMMARIZE_SESSION_TASK,
        Arc::new(SummarizeSessionHandler {
            pipeline: Arc::clone(&pipeline),
        }),
    );
    registry.register(
        COMPACT_TASK,
        Arc::new(CompactHandler {
            pipeline: Arc::clone(&pipeline),
        }),
    );
    registry.register(
        FORGET_TASK,
        Arc::new(ForgetHandler {
            pipeline: Arc::clone(&pipeline),
        }),
    );
    registry.register(TOUCH_TASK, Arc::new(TouchHandler { pipeline }));
}
