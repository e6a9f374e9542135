//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`RunEvent`]s. The UI and
//! automation tooling subscribe to it without the orchestrator depending
//! on their types. Share it via `Arc<EventBus>`.

use chrono::{DateTime, Utc};
use kiln_core::settings::DeviceMode;
use kiln_core::types::{ItemId, Stage};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// Something the orchestrator did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A stage body started.
    Begin { stage: Stage, mode: DeviceMode },

    /// The global progress bar advanced.
    Progress { value: f64, label: Option<String> },

    /// The progress bar returned to zero (run finished or failed).
    ProgressCleared,

    /// One item finished slicing.
    ItemSliced { item: ItemId },

    /// A stage body finished successfully.
    End { stage: Stage },

    /// A stage run failed. Published once per failed run.
    Error { stage: Stage, message: String },

    /// A busy run was cancelled by the user.
    Cancelled { stage: Stage },
}

impl PipelineEvent {
    /// Dot-separated event name, e.g. `"slice.begin"`.
    pub fn event_type(&self) -> String {
        match self {
            Self::Begin { stage, .. } => format!("{stage}.begin"),
            Self::Progress { .. } => "progress".to_string(),
            Self::ProgressCleared => "progress.clear".to_string(),
            Self::ItemSliced { .. } => "slice.item".to_string(),
            Self::End { stage } => format!("{stage}.end"),
            Self::Error { stage, .. } => format!("{stage}.error"),
            Self::Cancelled { stage } => format!("{stage}.cancel"),
        }
    }

    /// The stage this event belongs to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Begin { stage, .. }
            | Self::End { stage }
            | Self::Error { stage, .. }
            | Self::Cancelled { stage } => Some(*stage),
            Self::ItemSliced { .. } => Some(Stage::Slice),
            Self::Progress { .. } | Self::ProgressCleared => None,
        }
    }
}

// ---------------------------------------------------------------------------
// RunEvent
// ---------------------------------------------------------------------------

/// A [`PipelineEvent`] stamped with the run that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    /// Id of the `request_stage` call that produced the event.
    pub run_id: Uuid,

    pub event: PipelineEvent,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl RunEvent {
    pub fn new(run_id: Uuid, event: PipelineEvent) -> Self {
        Self {
            run_id,
            event,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> String {
        self.event.event_type()
    }

    /// JSON form for log sinks and automation hooks.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "event_type": self.event_type(),
            "run_id": self.run_id,
            "timestamp": self.timestamp,
            "payload": self.event,
        })
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use kiln_core::types::Stage;
/// use kiln_events::{EventBus, PipelineEvent, RunEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(RunEvent::new(uuid::Uuid::nil(), PipelineEvent::End { stage: Stage::Slice }));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no subscribers the event is dropped.
    pub fn publish(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
