//! Periodic compaction
//!
//! TigerStyle: Bounded windows, bounded wall-clock, no surprises.
//!
//! Promotion dedups within one session's batch; duplicates created across
//! sessions only meet here. Each run scans a bounded window of visible
//! records, groups them by `(user_id, namespace)`, and re-runs the semantic
//! containment rule inside each group. The run stops early when the
//! wall-clock budget is spent; the next run picks up the remainder.

use std::collections::HashMap;

use tracing::{debug, info};

use selkie_core::{
    MemoryRecord, RequestContext, Result, COMPACTION_RUN_MS_MAX, DEDUP_NEIGHBORS_COUNT,
};
use selkie_store::{Filters, TagFilter, VectorQuery};

use crate::dedupe::strictly_contains;
use crate::pipeline::Pipeline;

/// Result of one compaction run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    /// Records scanned
    pub scanned: usize,
    /// Supersessions applied
    pub superseded: usize,
    /// True when the run stopped on its wall-clock budget
    pub truncated: bool,
}

/// Run one bounded compaction pass
pub async fn compact(pipeline: &Pipeline, ctx: &RequestContext) -> Result<CompactionReport> {
    let mut report = CompactionReport::default();
    let window = pipeline.config.compaction.window_records_max;
    let threshold = pipeline.config.extraction.dedup_distance_threshold;
    let started_ms = pipeline.time.now_ms();

    // Newest window of visible records.
    let page = pipeline
        .long_term
        .search(VectorQuery::scan(Filters::default(), window))
        .await?;
    report.scanned = page.hits.len();

    // Group by (user_id, namespace).
    let mut groups: HashMap<(Option<String>, Option<String>), Vec<MemoryRecord>> = HashMap::new();
    for hit in page.hits {
        let key = (hit.record.user_id.clone(), hit.record.namespace.clone());
        groups.entry(key).or_default().push(hit.record);
    }

    'outer: for ((user_id, namespace), records) in groups {
        for record in records {
            if pipeline.time.now_ms().saturating_sub(started_ms) >= COMPACTION_RUN_MS_MAX {
                report.truncated = true;
                break 'outer;
            }
            ctx.check_deadline("compact")?;

            let Some(ref vector) = record.vector else {
                continue;
            };

            // The record may have been superseded earlier in this run.
            match pipeline.long_term.get(record.id).await? {
                Some(current) if current.is_searchable() => {}
                _ => continue,
            }

            let mut filters = Filters::default();
            if let Some(ref user_id) = user_id {
                filters.user_id = Some(TagFilter::eq(user_id.clone()));
            }
            if let Some(ref namespace) = namespace {
                filters.namespace = Some(TagFilter::eq(namespace.clone()));
            }

            let query = VectorQuery::semantic(vector.clone(), DEDUP_NEIGHBORS_COUNT)
                .with_filters(filters)
                .with_distance_threshold(threshold);
            let page = pipeline.long_term.search(query).await?;

            for hit in page.hits {
                if hit.record.id == record.id {
                    continue;
                }
                // Containment decides the survivor; without containment both
                // records stand (they differ in content, only their vectors
                // are close).
                if strictly_contains(&record.text, &hit.record.text) {
                    debug!(winner = %record.id, loser = %hit.record.id, "Compaction supersession");
                    pipeline.long_term.supersede(hit.record.id, record.id).await?;
                    report.superseded += 1;
                } else if strictly_contains(&hit.record.text, &record.text) {
                    debug!(winner = %hit.record.id, loser = %record.id, "Compaction supersession");
                    pipeline.long_term.supersede(record.id, hit.record.id).await?;
                    report.superseded += 1;
                    break;
                }
            }
        }
    }

    info!(
        scanned = report.scanned,
        superseded = report.superseded,
        truncated = report.truncated,
        "Compaction run complete"
    );
    Ok(report)
}
