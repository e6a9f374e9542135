//! Kiln pipeline notifications.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PipelineEvent`]: what happened (`slice.begin`, `preview.error`, ...).
//! - [`RunEvent`]: the envelope carrying an event, its run id and timestamp.

pub mod bus;

pub use bus::{EventBus, PipelineEvent, RunEvent};
