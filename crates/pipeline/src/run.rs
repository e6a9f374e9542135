//! Per-request context handed to the stage bodies.

use std::sync::{Arc, Mutex, MutexGuard};

use kiln_core::config::OrchestratorConfig;
use kiln_core::progress::ProgressMeter;
use kiln_core::settings::RunSettings;
use kiln_engine::ComputeEngine;
use kiln_events::{EventBus, PipelineEvent, RunEvent};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::controller::PipelineState;
use crate::error::PipelineError;
use crate::host::{Exporter, SceneHost, Workspace};

pub(crate) fn lock(state: &Mutex<PipelineState>) -> MutexGuard<'_, PipelineState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Everything one `request_stage` call needs. Owned by the request's
/// task; the settings snapshot is read-only for the whole request.
pub(crate) struct RunContext<'a> {
    pub engine: &'a dyn ComputeEngine,
    pub scene: &'a dyn SceneHost,
    pub workspace: &'a dyn Workspace,
    pub exporter: &'a dyn Exporter,
    pub bus: &'a EventBus,
    pub config: &'a OrchestratorConfig,
    pub state: &'a Mutex<PipelineState>,
    pub run_id: Uuid,
    pub cancel: CancellationToken,
    pub settings: Arc<RunSettings>,
    meter: ProgressMeter,
}

impl<'a> RunContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: &'a dyn ComputeEngine,
        scene: &'a dyn SceneHost,
        workspace: &'a dyn Workspace,
        exporter: &'a dyn Exporter,
        bus: &'a EventBus,
        config: &'a OrchestratorConfig,
        state: &'a Mutex<PipelineState>,
        settings: Arc<RunSettings>,
    ) -> Self {
        Self {
            engine,
            scene,
            workspace,
            exporter,
            bus,
            config,
            state,
            run_id: Uuid::now_v7(),
            cancel: CancellationToken::new(),
            settings,
            meter: ProgressMeter::new(),
        }
    }

    pub fn publish(&self, event: PipelineEvent) {
        self.bus.publish(RunEvent::new(self.run_id, event));
    }

    /// Publish a global progress value if it advances the bar.
    pub fn progress(&mut self, value: f64, label: Option<&str>) {
        if let Some(value) = self.meter.observe(value) {
            self.publish(PipelineEvent::Progress {
                value,
                label: label.map(str::to_string),
            });
        }
    }

    pub fn clear_progress(&mut self) {
        self.meter.reset();
        self.publish(PipelineEvent::ProgressCleared);
    }

    /// Fail with [`PipelineError::Cancelled`] once the run has been
    /// cancelled. Checked before every engine call and state commit.
    pub fn ensure_live(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    pub fn state(&self) -> MutexGuard<'_, PipelineState> {
        lock(self.state)
    }
}
