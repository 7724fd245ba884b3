//! Periodic forgetting
//!
//! TigerStyle: Small batches, audited deletes, explicit exemptions.
//!
//! A record is forgotten when it has not been accessed for
//! `forgetting_max_age_days` AND its access count stays below
//! `forgetting_min_access`. Episodic records whose `event_date` lies in the
//! future are exempt regardless of access history. Every deleted id is
//! logged.

use tracing::{debug, info};

use selkie_core::{
    MemoryId, MemoryType, RequestContext, Result, FORGETTING_BATCH_COUNT_MAX,
};
use selkie_store::{Filters, RangeFilter, VectorQuery};

use crate::pipeline::Pipeline;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Result of one forgetting run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ForgettingReport {
    /// Candidates considered
    pub considered: usize,
    /// Records deleted
    pub deleted: usize,
    /// Candidates retained by the access-count guard
    pub retained_by_access: usize,
    /// Candidates retained because their event lies in the future
    pub retained_future_event: usize,
}

/// Run one bounded forgetting pass
pub async fn forget(pipeline: &Pipeline, ctx: &RequestContext) -> Result<ForgettingReport> {
    let mut report = ForgettingReport::default();
    let config = &pipeline.config.forgetting;
    if !config.forgetting_enabled {
        return Ok(report);
    }
    ctx.check_deadline("forget")?;

    let now = pipeline.time.now_ms();
    let cutoff = now.saturating_sub(config.forgetting_max_age_days * DAY_MS);

    let filters = Filters {
        last_accessed_at: Some(RangeFilter::lt(cutoff)),
        ..Default::default()
    };
    let page = pipeline
        .long_term
        .search(VectorQuery::scan(filters, FORGETTING_BATCH_COUNT_MAX))
        .await?;
    report.considered = page.hits.len();

    let mut to_delete: Vec<MemoryId> = Vec::new();
    for hit in page.hits {
        let record = hit.record;

        if record.access_count >= config.forgetting_min_access {
            report.retained_by_access += 1;
            continue;
        }
        if record.memory_type == MemoryType::Episodic
            && record.event_date.is_some_and(|event| event > now)
        {
            report.retained_future_event += 1;
            continue;
        }

        debug!(
            id = %record.id,
            last_accessed_at = record.last_accessed_at,
            access_count = record.access_count,
            "Forgetting record"
        );
        to_delete.push(record.id);
    }

    if !to_delete.is_empty() {
        report.deleted = pipeline.long_term.delete(&to_delete).await?;
    }

    info!(
        considered = report.considered,
        deleted = report.deleted,
        retained_by_access = report.retained_by_access,
        retained_future_event = report.retained_future_event,
        "Forgetting run complete"
    );
    Ok(report)
}
