//! Slice / Preview / Export orchestration.
//!
//! [`Orchestrator`] sequences the pipeline stages over a single
//! [`ComputeEngine`](kiln_engine::ComputeEngine) session:
//!
//! - prerequisite stages run automatically, each reporting into its own
//!   slice of the caller's progress range;
//! - items are dispatched strictly one at a time, in registration order;
//! - per-item progress is blended into one monotonic progress value;
//! - the first error latches the run, resets the engine and is reported
//!   exactly once;
//! - stage completion is memoized in a
//!   [`StageCompletionRecord`](kiln_core::completion::StageCompletionRecord).

pub mod controller;
pub mod error;
pub mod host;
pub mod orchestrator;
pub mod outcome;

mod dispatcher;
mod run;
mod stages;

pub use controller::RunState;
pub use error::PipelineError;
pub use host::{Exporter, SceneHost, View, Workspace};
pub use orchestrator::Orchestrator;
pub use outcome::{StageOutcome, StageReport};
