use std::sync::Arc;
use std::time::Instant;

use kiln_core::timing::{SegmentLog, DRAW_LABEL};
use kiln_core::types::{PreviewMode, ProgressRange, Stage};
use kiln_events::PipelineEvent;

use super::{log_timing, PRINT_STACK};
use crate::dispatcher::finalize;
use crate::error::PipelineError;
use crate::host::View;
use crate::outcome::StageReport;
use crate::run::RunContext;

pub(crate) async fn run_preview(
    ctx: &mut RunContext<'_>,
    range: ProgressRange,
    mode: PreviewMode,
) -> Result<StageReport, PipelineError> {
    ctx.ensure_live()?;
    let mut segments = SegmentLog::start(Instant::now());

    ctx.state().completion.begin(Stage::Preview);
    ctx.scene.set_view(View::Preview);

    let settings = Arc::new(ctx.settings.as_ref().clone().with_preview_mode(mode));
    ctx.publish(PipelineEvent::Begin {
        stage: Stage::Preview,
        mode: settings.mode,
    });
    tracing::info!(run_id = %ctx.run_id, preview_mode = %mode, "Preparing preview");

    let engine = ctx.engine;
    let cancel = ctx.cancel.clone();
    let mut layers = Vec::new();
    let reply = {
        let ctx = &mut *ctx;
        let segments = &mut segments;
        finalize(engine, &cancel, Stage::Preview, settings, |fraction, phase, layer| {
            layers.extend(layer);
            segments.observe(None, phase.as_deref(), Instant::now());
            ctx.progress(range.map(fraction), phase.as_deref());
        })
        .await?
    };
    segments.close(None, Instant::now());

    let units = layers.len();
    if !layers.is_empty() {
        let alert = ctx
            .config
            .work_alerts
            .then(|| ctx.scene.show_alert("Rendering", None));
        let drawing = Instant::now();
        ctx.scene.clear_stacks();
        ctx.scene.create_stack(PRINT_STACK);
        ctx.scene.add_layers(PRINT_STACK, layers);
        if let Some(handle) = alert {
            ctx.scene.hide_alert(handle);
        }
        segments.record(None, DRAW_LABEL, drawing.elapsed(), Instant::now());
    }

    let speed_range = match (mode, reply.min_metric, reply.max_metric) {
        (PreviewMode::Speed, Some(min), Some(max)) => Some((min, max)),
        _ => None,
    };
    ctx.scene.update_speed_range(speed_range);

    ctx.ensure_live()?;
    ctx.state().completion.mark_previewed(mode)?;
    ctx.progress(range.end(), None);
    ctx.publish(PipelineEvent::End {
        stage: Stage::Preview,
    });

    let timing = segments.finish(Instant::now());
    log_timing(ctx, Stage::Preview, &timing);
    Ok(StageReport {
        stage: Stage::Preview,
        range,
        units,
        timing,
    })
}
