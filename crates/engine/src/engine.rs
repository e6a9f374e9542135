//! The [`ComputeEngine`] trait and the events it streams back.

use std::sync::Arc;

use kiln_core::settings::RunSettings;
use kiln_core::types::{ItemId, Stage};
use kiln_core::workset::WorkItem;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::EngineError;

/// Result of slicing one item, handed to the scene for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutput {
    pub item: ItemId,
    /// Number of layers produced.
    pub layers: u32,
}

/// One layer of finalized output. The payload format belongs to the
/// engine and the scene; the orchestrator only forwards it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerData {
    pub index: u32,
    pub payload: serde_json::Value,
}

/// Reply of a successful finalize step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FinalizeReply {
    /// Largest value of the preview metric (e.g. feed rate).
    pub max_metric: Option<f64>,
    pub min_metric: Option<f64>,
}

/// Update on a submitted item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemEvent {
    Progress {
        /// Local completion of this item in `[0, 1]`.
        fraction: f64,
        /// Human-readable phase, e.g. `"layer"`.
        phase: Option<String>,
        /// Text to show the user as-is.
        alert: Option<String>,
    },
    Complete(Result<ItemOutput, EngineError>),
}

/// Update on a stage finalize step.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeEvent {
    LayerProgress {
        fraction: f64,
        phase: Option<String>,
        layer: Option<LayerData>,
    },
    Complete(Result<FinalizeReply, EngineError>),
}

/// A single-session compute engine.
///
/// The session is a serial resource: callers submit one item, wait for
/// its [`ItemEvent::Complete`], and only then submit the next. Events
/// may keep arriving on a receiver after its completion; callers drop
/// the receiver when they no longer care.
pub trait ComputeEngine: Send + Sync {
    /// Start slicing `item`.
    fn submit_item(
        &self,
        item: &WorkItem,
        settings: Arc<RunSettings>,
    ) -> mpsc::UnboundedReceiver<ItemEvent>;

    /// Run the aggregate step that closes `stage` once every item is done.
    fn finalize_stage(
        &self,
        stage: Stage,
        settings: Arc<RunSettings>,
    ) -> mpsc::UnboundedReceiver<FinalizeEvent>;

    /// Abort anything in flight and start a fresh session.
    fn reset_session(&self);

    fn is_session_busy(&self) -> bool;

    /// Drop cached per-item state so the next run re-syncs everything.
    fn clear_cache(&self) {}
}
