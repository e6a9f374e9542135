//! Stage bodies. Each runs one stage over the request's context and
//! returns its report; failures propagate to the orchestrator, which
//! owns the error path.

mod export;
mod preview;
mod slice;

pub(crate) use export::run_export;
pub(crate) use preview::run_preview;
pub(crate) use slice::run_slice;

use kiln_core::timing::RunTiming;
use kiln_core::types::Stage;

use crate::run::RunContext;

/// Stack holding the finalized preview output.
pub(crate) const PRINT_STACK: &str = "print";

fn log_timing(ctx: &RunContext<'_>, stage: Stage, timing: &RunTiming) {
    tracing::info!(
        run_id = %ctx.run_id,
        stage = %stage,
        total_ms = timing.total.as_millis() as u64,
        draw_ms = timing.time_in(kiln_core::timing::DRAW_LABEL).as_millis() as u64,
        segments = timing.segments.len(),
        "Stage timing",
    );
    for segment in &timing.segments {
        tracing::debug!(
            run_id = %ctx.run_id,
            key = %segment.key,
            start_ms = segment.start.as_millis() as u64,
            duration_ms = segment.duration.as_millis() as u64,
            "Timing segment",
        );
    }
}
