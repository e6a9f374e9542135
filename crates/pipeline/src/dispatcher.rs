//! Sequential item dispatch.
//!
//! Items go to the engine strictly one at a time: the next submission
//! waits for the previous item's completion. The first failure stops the
//! loop; later items are never submitted. Every wait is raced against the
//! run's cancellation token.

use std::sync::Arc;
use std::time::Instant;

use kiln_core::progress::ProgressAggregator;
use kiln_core::settings::RunSettings;
use kiln_core::timing::SegmentLog;
use kiln_core::types::{ItemId, ProgressRange, Stage};
use kiln_core::workset::WorkSet;
use kiln_engine::{
    ComputeEngine, EngineError, FinalizeEvent, FinalizeReply, ItemEvent, ItemOutput, LayerData,
};
use kiln_events::PipelineEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::run::RunContext;

/// Wait for the next engine event unless the run is cancelled first.
async fn next_event<T>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    cancel: &CancellationToken,
) -> Result<Option<T>, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        event = rx.recv() => Ok(event),
    }
}

/// Discard whatever the engine queued after a failure.
fn drop_late_events<T: std::fmt::Debug>(
    item_id: Option<&ItemId>,
    rx: &mut mpsc::UnboundedReceiver<T>,
) {
    while let Ok(late) = rx.try_recv() {
        tracing::debug!(item_id = ?item_id, event = ?late, "Dropping late engine callback");
    }
    rx.close();
}

/// Slice every item of `work` in order, reporting weighted progress into
/// `range`. Returns the outputs in dispatch order.
pub(crate) async fn dispatch_items(
    ctx: &mut RunContext<'_>,
    work: &WorkSet,
    range: ProgressRange,
    segments: &mut SegmentLog,
) -> Result<Vec<ItemOutput>, PipelineError> {
    let mut aggregator = ProgressAggregator::new(work);
    let mut outputs = Vec::with_capacity(work.len());

    for item in work.items() {
        ctx.scene.create_stack(item.id.as_str());
        tracing::debug!(item_id = %item.id, weight = item.weight, "Dispatching item");

        ctx.ensure_live()?;
        let mut rx = ctx.engine.submit_item(item, Arc::clone(&ctx.settings));
        let result = loop {
            match next_event(&mut rx, &ctx.cancel).await? {
                Some(ItemEvent::Progress {
                    fraction,
                    phase,
                    alert,
                }) => {
                    if let Some(text) = alert {
                        ctx.scene.show_alert(&text, None);
                    }
                    segments.observe(Some(&item.id), phase.as_deref(), Instant::now());
                    let global = aggregator.update(&item.id, fraction)?;
                    ctx.progress(range.map(global), phase.as_deref());
                }
                Some(ItemEvent::Complete(result)) => break result,
                None => break Err(EngineError::SessionClosed),
            }
        };

        match result {
            Ok(output) => {
                segments.close(Some(&item.id), Instant::now());
                let global = aggregator.update(&item.id, 1.0)?;
                ctx.progress(range.map(global), None);
                ctx.publish(PipelineEvent::ItemSliced {
                    item: item.id.clone(),
                });
                outputs.push(output);
            }
            Err(err) => {
                drop_late_events(Some(&item.id), &mut rx);
                tracing::warn!(item_id = %item.id, error = %err, "Item failed, halting dispatch");
                return Err(err.into());
            }
        }
    }

    Ok(outputs)
}

/// Run the engine's finalize step for `stage`, passing each update to
/// `on_update` as `(fraction, phase, layer)`.
pub(crate) async fn finalize<F>(
    engine: &dyn ComputeEngine,
    cancel: &CancellationToken,
    stage: Stage,
    settings: Arc<RunSettings>,
    mut on_update: F,
) -> Result<FinalizeReply, PipelineError>
where
    F: FnMut(f64, Option<String>, Option<LayerData>),
{
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    let mut rx = engine.finalize_stage(stage, settings);
    loop {
        match next_event(&mut rx, cancel).await? {
            Some(FinalizeEvent::LayerProgress {
                fraction,
                phase,
                layer,
            }) => on_update(fraction, phase, layer),
            Some(FinalizeEvent::Complete(Ok(reply))) => return Ok(reply),
            Some(FinalizeEvent::Complete(Err(err))) => {
                drop_late_events(None, &mut rx);
                tracing::warn!(stage = %stage, error = %err, "Finalize step failed");
                return Err(err.into());
            }
            None => return Err(EngineError::SessionClosed.into()),
        }
    }
}
