//! Stage dependency planning.
//!
//! [`plan`] expands a requested stage into the ordered list of stage runs
//! needed to satisfy it, given what the completion record already holds.
//! Each missing prerequisite gets a leading slice of the caller's progress
//! range and the requested stage keeps the remainder, recursively, so an
//! Export from scratch reports Slice, Preview and Export into disjoint,
//! ascending ranges that never exceed the caller's bounds.

use serde::Serialize;

use crate::completion::StageCompletionRecord;
use crate::types::{PreviewMode, ProgressRange, Stage};

/// One stage run in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlannedStep {
    pub stage: Stage,
    pub range: ProgressRange,
}

/// Ordered stage runs for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagePlan {
    pub steps: Vec<PlannedStep>,
    /// Preview variant the plan renders (after any cycling).
    pub preview_mode: PreviewMode,
}

impl StagePlan {
    /// Nothing to run: the request is already satisfied.
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.steps.iter().map(|s| s.stage).collect()
    }
}

/// Orchestrator state a plan is computed against.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub completion: StageCompletionRecord,
    /// Currently selected preview variant.
    pub preview_mode: PreviewMode,
    /// Variants offered by the device, in cycling order.
    pub preview_modes: &'a [PreviewMode],
    /// Re-run the requested Preview even if its variant is valid.
    pub redo: bool,
    /// Share of a range handed to a prerequisite.
    pub prerequisite_share: f64,
    /// A top-level Slice continues into Preview (resin devices).
    pub slice_continues_to_preview: bool,
}

/// Expand `target` into the stage runs that satisfy it within `range`.
pub fn plan(target: Stage, range: ProgressRange, ctx: &PlanContext<'_>) -> StagePlan {
    let mut steps = Vec::new();
    let mut mode = ctx.preview_mode;

    if target == Stage::Slice && ctx.slice_continues_to_preview {
        let (lead, rest) = range.split(ctx.prerequisite_share);
        steps.push(PlannedStep {
            stage: Stage::Slice,
            range: lead,
        });
        steps.push(PlannedStep {
            stage: Stage::Preview,
            range: rest,
        });
    } else {
        expand(target, range, ctx, &mut mode, &mut steps);
    }

    StagePlan {
        steps,
        preview_mode: mode,
    }
}

fn expand(
    stage: Stage,
    range: ProgressRange,
    ctx: &PlanContext<'_>,
    mode: &mut PreviewMode,
    steps: &mut Vec<PlannedStep>,
) {
    match stage {
        Stage::Slice => steps.push(PlannedStep { stage, range }),
        Stage::Preview => {
            if ctx.completion.preview() == Some(*mode) && !ctx.redo {
                let next = mode.next_in(ctx.preview_modes);
                if next == *mode {
                    // Single variant: already complete.
                    return;
                }
                *mode = next;
            }
            if ctx.completion.slice() {
                steps.push(PlannedStep { stage, range });
            } else {
                let (lead, rest) = range.split(ctx.prerequisite_share);
                steps.push(PlannedStep {
                    stage: Stage::Slice,
                    range: lead,
                });
                steps.push(PlannedStep { stage, range: rest });
            }
        }
        Stage::Export => {
            if ctx.completion.preview().is_some() {
                steps.push(PlannedStep { stage, range });
            } else {
                let (lead, rest) = range.split(ctx.prerequisite_share);
                expand(Stage::Preview, lead, ctx, mode, steps);
                steps.push(PlannedStep { stage, range: rest });
            }
        }
    }
}
