use std::sync::Arc;
use std::time::Instant;

use kiln_core::timing::{SegmentLog, DRAW_LABEL};
use kiln_core::types::{ProgressRange, Stage};
use kiln_core::workset::{belt_anchor, build_work_set, needs_relayout};
use kiln_events::PipelineEvent;

use super::log_timing;
use crate::dispatcher::{dispatch_items, finalize};
use crate::error::PipelineError;
use crate::host::View;
use crate::outcome::StageReport;
use crate::run::RunContext;

pub(crate) async fn run_slice(
    ctx: &mut RunContext<'_>,
    range: ProgressRange,
) -> Result<StageReport, PipelineError> {
    ctx.ensure_live()?;
    let mut segments = SegmentLog::start(Instant::now());

    if ctx.scene.view() == View::Arrange {
        if let Some(shot) = ctx.scene.screenshot() {
            ctx.state().snapshot = Some(shot);
        }
    }

    let mut records = ctx.workspace.items();
    if needs_relayout(&records, &ctx.settings.device) {
        tracing::info!(run_id = %ctx.run_id, "Item exceeds bed depth, re-laying out");
        ctx.workspace.relayout();
        records = ctx.workspace.items();
    }

    ctx.scene.set_view(View::Slice);
    let work = build_work_set(&records)?;

    let anchor = belt_anchor(&work, &ctx.settings);
    if anchor.is_some() {
        ctx.settings = Arc::new(ctx.settings.as_ref().clone().with_belt_anchor(anchor));
    }

    ctx.state().completion.begin(Stage::Slice);
    ctx.scene.clear_stacks();
    if ctx.settings.device.belt {
        ctx.engine.clear_cache();
    }
    ctx.publish(PipelineEvent::Begin {
        stage: Stage::Slice,
        mode: ctx.settings.mode,
    });
    tracing::info!(
        run_id = %ctx.run_id,
        items = work.len(),
        mean_cost = work.mean_cost(),
        belt_anchor = ?anchor,
        "Slicing",
    );

    let outputs = dispatch_items(ctx, &work, range, &mut segments).await?;

    let engine = ctx.engine;
    let cancel = ctx.cancel.clone();
    finalize(engine, &cancel, Stage::Slice, Arc::clone(&ctx.settings), |_, _, _| {}).await?;

    let alert = (range == ProgressRange::FULL && ctx.config.work_alerts)
        .then(|| ctx.scene.show_alert("Rendering", None));
    for output in &outputs {
        let spent = ctx.scene.render_item(output);
        segments.record(Some(&output.item), DRAW_LABEL, spent, Instant::now());
    }
    if let Some(handle) = alert {
        ctx.scene.hide_alert(handle);
    }

    ctx.ensure_live()?;
    ctx.state().completion.mark_sliced();
    ctx.publish(PipelineEvent::End {
        stage: Stage::Slice,
    });

    let timing = segments.finish(Instant::now());
    log_timing(ctx, Stage::Slice, &timing);
    Ok(StageReport {
        stage: Stage::Slice,
        range,
        units: outputs.len(),
        timing,
    })
}
