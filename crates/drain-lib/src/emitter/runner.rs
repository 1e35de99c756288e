//! Timeline replay

use super::ActionEmitter;
use crate::error::{DrainError, Result};
use crate::models::Timeline;
use crate::observability::{DrainMetrics, StructuredLogger};
use std::time::Instant;

/// Outcome of a completed replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub drained: usize,
    pub actions: usize,
    pub skipped: usize,
}

/// Replay a timeline through an emitter, stopping at the first failure
///
/// Completed actions are not rolled back; the error carries the failing
/// command so an operator can resume by hand.
pub async fn run_timeline(
    timeline: &Timeline,
    emitter: &mut dyn ActionEmitter,
    metrics: &DrainMetrics,
    logger: &StructuredLogger,
) -> Result<RunSummary> {
    let mut summary = RunSummary {
        skipped: timeline.skipped.len(),
        ..RunSummary::default()
    };

    emitter.begin(timeline).await?;

    for skipped in &timeline.skipped {
        logger.log_container_skipped(&skipped.id, &skipped.reason);
        emitter.skipped(skipped).await?;
    }
    metrics.inc_containers_skipped(timeline.skipped.len() as u64);

    for cycle in &timeline.cycles {
        emitter.begin_cycle(cycle).await?;

        for action in &cycle.actions {
            let kind = action.action.kind();
            let start = Instant::now();

            if let Err(e) = emitter.emit(action).await {
                if let DrainError::Interrupted = e {
                    logger.log_interrupted(summary.drained);
                } else {
                    metrics.inc_action_failures(kind);
                    logger.log_action_failed(&action.container_id, kind, &e.to_string());
                }
                return Err(e);
            }

            metrics.observe_action(kind, start.elapsed().as_secs_f64());
            summary.actions += 1;
        }

        emitter.end_cycle(cycle).await?;
        summary.drained += 1;
        metrics.inc_containers_drained();
        logger.log_container_drained(
            &cycle.container.id,
            &cycle.container.key().to_string(),
            cycle.killed_at,
            cycle.previous_kill,
        );
    }

    emitter.finish(timeline).await?;
    logger.log_run_finished(summary.drained, summary.actions, timeline.ends_at);
    Ok(summary)
}
