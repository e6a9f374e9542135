//! The public surface of the pipeline.
//!
//! [`Orchestrator`] is created once by the host and shared via `Arc`.
//! `request_stage` resolves the stages a request needs, runs them in
//! order on the calling task and resolves exactly once. `cancel` may be
//! called from any other task at any time.

use std::sync::{Arc, Mutex};

use kiln_core::completion::StageCompletionRecord;
use kiln_core::config::OrchestratorConfig;
use kiln_core::resolver::{self, PlanContext};
use kiln_core::settings::DeviceMode;
use kiln_core::types::{PreviewMode, ProgressRange, Stage};
use kiln_engine::ComputeEngine;
use kiln_events::{EventBus, PipelineEvent, RunEvent};
use tokio::sync::broadcast;

use crate::controller::{PipelineState, RunState};
use crate::error::PipelineError;
use crate::host::{Exporter, SceneHost, View, Workspace};
use crate::outcome::StageOutcome;
use crate::run::{lock, RunContext};
use crate::stages::{run_export, run_preview, run_slice};

pub struct Orchestrator {
    config: OrchestratorConfig,
    engine: Arc<dyn ComputeEngine>,
    scene: Arc<dyn SceneHost>,
    workspace: Arc<dyn Workspace>,
    exporter: Arc<dyn Exporter>,
    bus: Arc<EventBus>,
    state: Mutex<PipelineState>,
    /// Held for the whole of a request; the engine serves one run at a time.
    run_lock: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        engine: Arc<dyn ComputeEngine>,
        scene: Arc<dyn SceneHost>,
        workspace: Arc<dyn Workspace>,
        exporter: Arc<dyn Exporter>,
        bus: Arc<EventBus>,
    ) -> Self {
        let preview_mode = workspace
            .settings()
            .preview_modes()
            .first()
            .copied()
            .unwrap_or(PreviewMode::Speed);
        Self {
            config,
            engine,
            scene,
            workspace,
            exporter,
            bus,
            state: Mutex::new(PipelineState::new(preview_mode)),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.bus.subscribe()
    }

    /// Run `target`, and any stale prerequisite before it, reporting
    /// progress into `range`.
    ///
    /// With `redo`, a Preview whose variant is already valid is re-run
    /// instead of cycling to the next variant.
    pub async fn request_stage(
        &self,
        target: Stage,
        range: ProgressRange,
        redo: bool,
    ) -> Result<StageOutcome, PipelineError> {
        range.validate()?;

        let _run = self.run_lock.try_lock().map_err(|_| {
            let running = match lock(&self.state).run_state() {
                RunState::Running(stage) => stage,
                _ => target,
            };
            PipelineError::Busy(running)
        })?;

        let mut ctx = RunContext::new(
            self.engine.as_ref(),
            self.scene.as_ref(),
            self.workspace.as_ref(),
            self.exporter.as_ref(),
            &self.bus,
            &self.config,
            &self.state,
            Arc::new(self.workspace.settings()),
        );

        let plan = {
            let mut state = ctx.state();
            let plan = resolver::plan(
                target,
                range,
                &PlanContext {
                    completion: state.completion,
                    preview_mode: state.preview_mode,
                    preview_modes: ctx.settings.preview_modes(),
                    redo,
                    prerequisite_share: self.config.prerequisite_share,
                    slice_continues_to_preview: ctx.settings.mode == DeviceMode::Sla,
                },
            );
            state.preview_mode = plan.preview_mode;
            plan
        };

        let mut outcome = StageOutcome {
            run_id: ctx.run_id,
            target,
            mode: ctx.settings.mode,
            preview_mode: plan.preview_mode,
            reports: Vec::with_capacity(plan.steps.len()),
        };
        if plan.is_noop() {
            tracing::info!(
                stage = %target,
                preview_mode = %plan.preview_mode,
                "Stage already complete",
            );
            return Ok(outcome);
        }

        ctx.state().start(ctx.run_id, target, ctx.cancel.clone());
        tracing::info!(
            run_id = %ctx.run_id,
            stage = %target,
            steps = ?plan.stages(),
            "Run started",
        );

        for step in &plan.steps {
            ctx.state().enter(step.stage);
            let result = match step.stage {
                Stage::Slice => run_slice(&mut ctx, step.range).await,
                Stage::Preview => run_preview(&mut ctx, step.range, plan.preview_mode).await,
                Stage::Export => run_export(&mut ctx, step.range, plan.preview_mode).await,
            };
            match result {
                Ok(report) => outcome.reports.push(report),
                Err(err) => {
                    self.fail(&mut ctx, step.stage, &err);
                    ctx.state().finish();
                    return Err(err);
                }
            }
        }

        let completed = ctx.state().complete(target);
        ctx.clear_progress();
        ctx.state().finish();
        if !completed {
            return Err(PipelineError::Cancelled);
        }

        tracing::info!(
            run_id = %ctx.run_id,
            stage = %target,
            stages = ?outcome.stages_run(),
            "Run completed",
        );
        Ok(outcome)
    }

    /// Abort the running request if the engine is busy. Returns whether
    /// anything was cancelled; an idle engine makes this a no-op.
    ///
    /// The completion record is left as the interrupted run left it.
    pub fn cancel(&self) -> bool {
        if !self.engine.is_session_busy() {
            tracing::debug!("Cancel ignored, engine session idle");
            return false;
        }

        let run = lock(&self.state).latch_cancel();
        match run {
            Some(run) => {
                run.cancel.cancel();
                self.engine.reset_session();
                self.bus.publish(RunEvent::new(
                    run.run_id,
                    PipelineEvent::Cancelled { stage: run.stage },
                ));
                self.bus
                    .publish(RunEvent::new(run.run_id, PipelineEvent::ProgressCleared));
                tracing::info!(run_id = %run.run_id, stage = %run.stage, "Run cancelled");
            }
            None => {
                self.engine.reset_session();
                tracing::info!("Engine session reset with no active run");
            }
        }
        true
    }

    /// Forget every completed stage (new model loaded).
    pub fn clear_completion_cache(&self) {
        lock(&self.state).completion.clear();
        tracing::debug!("Completion cache cleared");
    }

    /// Select the preview variant used by the next Preview run.
    pub fn set_preview_mode(&self, mode: PreviewMode) {
        lock(&self.state).preview_mode = mode;
    }

    pub fn preview_mode(&self) -> PreviewMode {
        lock(&self.state).preview_mode
    }

    pub fn run_state(&self) -> RunState {
        lock(&self.state).run_state()
    }

    pub fn completion(&self) -> StageCompletionRecord {
        lock(&self.state).completion
    }

    /// Screenshot of the arrange view taken when the last Slice started.
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        lock(&self.state).snapshot.clone()
    }

    // ---- private helpers ----

    /// The error path: latch, restore the editable view, alert once,
    /// reset the engine, publish `<stage>.error`.
    fn fail(&self, ctx: &mut RunContext<'_>, stage: Stage, err: &PipelineError) {
        if !err.is_user_visible() {
            tracing::info!(run_id = %ctx.run_id, stage = %stage, "Run aborted: {err}");
            return;
        }
        if ctx.state().latch_error().is_none() {
            tracing::debug!(
                run_id = %ctx.run_id,
                stage = %stage,
                error = %err,
                "Error after run latched, ignoring",
            );
            return;
        }

        tracing::error!(run_id = %ctx.run_id, stage = %stage, error = %err, "Stage failed");
        let message = err.to_string();
        ctx.scene.set_view(View::Arrange);
        ctx.scene.show_alert(&message, Some(self.config.alert_dismiss));
        ctx.clear_progress();
        if err.needs_engine_reset() {
            ctx.engine.reset_session();
            if stage == Stage::Slice {
                ctx.scene.clear_stacks();
            }
        }
        ctx.publish(PipelineEvent::Error { stage, message });
    }
}
