/// Failures reported by a compute engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// The engine rejected the work; the message is shown to the user.
    #[error("{0}")]
    Failed(String),

    /// The update stream ended without a completion.
    #[error("Engine session closed before completion")]
    SessionClosed,

    /// The session was reset while the work was in flight.
    #[error("Engine session was reset")]
    SessionReset,
}
