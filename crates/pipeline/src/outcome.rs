use kiln_core::settings::DeviceMode;
use kiln_core::timing::RunTiming;
use kiln_core::types::{PreviewMode, ProgressRange, Stage};
use serde::Serialize;
use uuid::Uuid;

/// One stage body executed during a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    /// Progress range the stage reported into.
    pub range: ProgressRange,
    /// Items sliced (Slice) or layers received (Preview).
    pub units: usize,
    pub timing: RunTiming,
}

/// Resolved value of a successful `request_stage`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutcome {
    pub run_id: Uuid,
    /// The stage that was requested.
    pub target: Stage,
    pub mode: DeviceMode,
    /// Preview variant selected after the request.
    pub preview_mode: PreviewMode,
    /// Stage bodies run, in order. Empty when the target was already
    /// complete.
    pub reports: Vec<StageReport>,
}

impl StageOutcome {
    pub fn stages_run(&self) -> Vec<Stage> {
        self.reports.iter().map(|r| r.stage).collect()
    }

    pub fn already_complete(&self) -> bool {
        self.reports.is_empty()
    }
}
