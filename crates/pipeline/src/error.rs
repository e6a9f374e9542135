use kiln_core::error::CoreError;
use kiln_core::types::Stage;
use kiln_engine::EngineError;

/// Why a `request_stage` call did not complete.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// No eligible items; nothing was sent to the engine.
    #[error("Nothing to slice")]
    EmptyWorkSet,

    /// The compute engine reported a failure. Carries its message.
    #[error("{0}")]
    Engine(String),

    /// The user cancelled the run. Not reported as an error.
    #[error("Run cancelled")]
    Cancelled,

    /// Another run holds the engine.
    #[error("A {0} run is already in progress")]
    Busy(Stage),

    #[error("Export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Core(CoreError),
}

impl PipelineError {
    /// Whether the error is alerted to the user and published as
    /// `<stage>.error`.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::Busy(_))
    }

    /// Whether the engine session must be reset before the next run.
    pub fn needs_engine_reset(&self) -> bool {
        matches!(self, Self::Engine(_))
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::EmptyWorkSet => Self::EmptyWorkSet,
            other => Self::Core(other),
        }
    }
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err.to_string())
    }
}
