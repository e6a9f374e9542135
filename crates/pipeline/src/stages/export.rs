use std::sync::Arc;
use std::time::Instant;

use kiln_core::timing::SegmentLog;
use kiln_core::types::{PreviewMode, ProgressRange, Stage};
use kiln_events::PipelineEvent;

use super::log_timing;
use crate::error::PipelineError;
use crate::outcome::StageReport;
use crate::run::RunContext;

pub(crate) async fn run_export(
    ctx: &mut RunContext<'_>,
    range: ProgressRange,
    preview_mode: PreviewMode,
) -> Result<StageReport, PipelineError> {
    ctx.ensure_live()?;
    let mut segments = SegmentLog::start(Instant::now());

    ctx.state().completion.begin(Stage::Export);
    ctx.publish(PipelineEvent::Begin {
        stage: Stage::Export,
        mode: ctx.settings.mode,
    });
    segments.observe(None, Some("export"), Instant::now());

    let exporter = ctx.exporter;
    let cancel = ctx.cancel.clone();
    let settings = Arc::new(ctx.settings.as_ref().clone().with_preview_mode(preview_mode));
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
        result = exporter.export(&settings) => {
            result.map_err(|e| PipelineError::Export(format!("{e:#}")))?;
        }
    }

    ctx.ensure_live()?;
    ctx.state().completion.mark_exported()?;
    ctx.progress(range.end(), None);
    ctx.publish(PipelineEvent::End {
        stage: Stage::Export,
    });

    let timing = segments.finish(Instant::now());
    log_timing(ctx, Stage::Export, &timing);
    Ok(StageReport {
        stage: Stage::Export,
        range,
        units: 0,
        timing,
    })
}
