//! Run state and the per-run error latch.
//!
//! [`PipelineState`] is the single mutable value behind the orchestrator:
//! the completion record, the selected preview variant, the last snapshot
//! and the active run. Runs move `Idle -> Running -> {Completed, Errored,
//! Cancelled}`; the latch on the active run lets exactly one terminal
//! transition through.

use kiln_core::completion::StageCompletionRecord;
use kiln_core::types::{PreviewMode, Stage};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Observable state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    /// A run is executing the given stage body.
    Running(Stage),
    /// The last run finished its target stage.
    Completed(Stage),
    /// The last run failed in the given stage.
    Errored(Stage),
    /// The last run was cancelled while in the given stage.
    Cancelled(Stage),
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }
}

/// The run currently holding the engine.
#[derive(Debug, Clone)]
pub(crate) struct ActiveRun {
    pub run_id: Uuid,
    pub stage: Stage,
    pub cancel: CancellationToken,
    latched: bool,
}

#[derive(Debug)]
pub(crate) struct PipelineState {
    pub completion: StageCompletionRecord,
    pub preview_mode: PreviewMode,
    pub snapshot: Option<Vec<u8>>,
    run_state: RunState,
    active: Option<ActiveRun>,
}

impl PipelineState {
    pub fn new(preview_mode: PreviewMode) -> Self {
        Self {
            completion: StageCompletionRecord::new(),
            preview_mode,
            snapshot: None,
            run_state: RunState::Idle,
            active: None,
        }
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// A new run takes the engine.
    pub fn start(&mut self, run_id: Uuid, stage: Stage, cancel: CancellationToken) {
        self.active = Some(ActiveRun {
            run_id,
            stage,
            cancel,
            latched: false,
        });
        self.run_state = RunState::Running(stage);
    }

    /// The active run moves on to the body of `stage`.
    pub fn enter(&mut self, stage: Stage) {
        if let Some(run) = self.active.as_mut().filter(|r| !r.latched) {
            run.stage = stage;
            self.run_state = RunState::Running(stage);
        }
    }

    /// Trip the latch for an error. Returns the failing stage if this
    /// call took the terminal transition.
    pub fn latch_error(&mut self) -> Option<Stage> {
        let run = self.active.as_mut().filter(|r| !r.latched)?;
        run.latched = true;
        self.run_state = RunState::Errored(run.stage);
        Some(run.stage)
    }

    /// Trip the latch for a user cancel. Returns the active run if this
    /// call took the terminal transition.
    pub fn latch_cancel(&mut self) -> Option<ActiveRun> {
        let run = self.active.as_mut().filter(|r| !r.latched)?;
        run.latched = true;
        self.run_state = RunState::Cancelled(run.stage);
        Some(run.clone())
    }

    /// The run reached its target. Returns false if it was latched first.
    pub fn complete(&mut self, target: Stage) -> bool {
        match self.active.as_mut().filter(|r| !r.latched) {
            Some(run) => {
                run.latched = true;
                self.run_state = RunState::Completed(target);
                true
            }
            None => false,
        }
    }

    /// Release the engine. The terminal state stays observable.
    pub fn finish(&mut self) {
        self.active = None;
        if self.run_state.is_running() {
            self.run_state = RunState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(stage: Stage) -> PipelineState {
        let mut state = PipelineState::new(PreviewMode::Speed);
        state.start(Uuid::nil(), stage, CancellationToken::new());
        state
    }

    #[test]
    fn first_error_wins() {
        let mut state = running(Stage::Slice);
        assert_eq!(state.latch_error(), Some(Stage::Slice));
        assert_eq!(state.latch_error(), None);
        assert!(state.latch_cancel().is_none());
        assert!(!state.complete(Stage::Slice));
        assert_eq!(state.run_state(), RunState::Errored(Stage::Slice));
    }

    #[test]
    fn cancel_blocks_later_error_and_completion() {
        let mut state = running(Stage::Export);
        state.enter(Stage::Preview);
        let run = state.latch_cancel().expect("active run");
        assert_eq!(run.stage, Stage::Preview);
        assert_eq!(state.latch_error(), None);
        assert!(!state.complete(Stage::Export));
        assert_eq!(state.run_state(), RunState::Cancelled(Stage::Preview));
    }

    #[test]
    fn completion_reports_target_stage() {
        let mut state = running(Stage::Export);
        state.enter(Stage::Slice);
        state.enter(Stage::Export);
        assert!(state.complete(Stage::Export));
        state.finish();
        assert_eq!(state.run_state(), RunState::Completed(Stage::Export));
    }

    #[test]
    fn idle_state_has_nothing_to_latch() {
        let mut state = PipelineState::new(PreviewMode::Speed);
        assert_eq!(state.latch_error(), None);
        assert!(state.latch_cancel().is_none());
        assert_eq!(state.run_state(), RunState::Idle);
    }

    #[test]
    fn finish_without_terminal_transition_returns_to_idle() {
        let mut state = running(Stage::Slice);
        state.finish();
        assert_eq!(state.run_state(), RunState::Idle);
    }
}
