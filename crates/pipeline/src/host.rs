//! Collaborators the orchestrator drives besides the engine.
//!
//! The host application implements these over its item registry, its
//! scene graph and its file output. All calls are made from the
//! orchestrating task and are expected to return quickly.

use std::time::Duration;

use async_trait::async_trait;
use kiln_core::settings::RunSettings;
use kiln_core::workset::ItemRecord;
use kiln_engine::{ItemOutput, LayerData};
use serde::Serialize;

/// Which scene view is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Editable model layout.
    Arrange,
    Slice,
    Preview,
}

/// Source of items and settings.
pub trait Workspace: Send + Sync {
    /// All registered items, in registration order.
    fn items(&self) -> Vec<ItemRecord>;

    /// Current settings. Captured once per request.
    fn settings(&self) -> RunSettings;

    /// Re-arrange items so they fit the bed.
    fn relayout(&self);
}

/// The rendering side: views, stacks, alerts.
pub trait SceneHost: Send + Sync {
    fn view(&self) -> View;

    fn set_view(&self, view: View);

    /// Capture the current view, if the scene supports it.
    fn screenshot(&self) -> Option<Vec<u8>>;

    /// Remove every rendered stack.
    fn clear_stacks(&self);

    fn create_stack(&self, id: &str);

    /// Materialise an item's sliced output into its stack and return the
    /// time spent doing so.
    fn render_item(&self, output: &ItemOutput) -> Duration;

    fn add_layers(&self, stack: &str, layers: Vec<LayerData>);

    /// Show `text`; `dismiss` hides it automatically after the delay.
    /// Returns a handle for [`SceneHost::hide_alert`].
    fn show_alert(&self, text: &str, dismiss: Option<Duration>) -> u64;

    fn hide_alert(&self, handle: u64);

    /// Legend range for speed previews; `None` clears it.
    fn update_speed_range(&self, range: Option<(f64, f64)>);
}

/// Writes machine output for a previewed run.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, settings: &RunSettings) -> anyhow::Result<()>;
}
