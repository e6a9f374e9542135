//! In-memory host collaborators for the standalone runner.
//!
//! [`DemoWorkspace`] serves a fixed set of sample items, [`LogScene`]
//! renders to the log and [`JsonExporter`] writes the run settings as
//! JSON next to the binary.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use kiln_core::settings::{DeviceMode, DeviceSettings, RunSettings};
use kiln_core::types::PreviewMode;
use kiln_core::workset::ItemRecord;
use kiln_engine::{ItemOutput, LayerData};
use kiln_pipeline::{Exporter, SceneHost, View, Workspace};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

pub struct DemoWorkspace {
    items: Mutex<Vec<ItemRecord>>,
    settings: RunSettings,
}

impl DemoWorkspace {
    pub fn new(items: Vec<ItemRecord>, settings: RunSettings) -> Self {
        Self {
            items: Mutex::new(items),
            settings,
        }
    }

    /// Three parts of uneven cost plus a disabled one.
    pub fn sample(mode: DeviceMode, belt: bool) -> Self {
        let mut items = vec![
            ItemRecord::new("bracket", 12_000),
            ItemRecord::new("hinge", 4_000),
            ItemRecord::new("enclosure", 44_000),
            ItemRecord::new("spare", 8_000),
        ];
        items[2].depth_span = 320.0;
        items[3].disabled = true;

        let settings = RunSettings {
            mode,
            device: DeviceSettings {
                belt,
                preview_modes: vec![PreviewMode::Speed, PreviewMode::Feature],
                ..Default::default()
            },
            ..Default::default()
        };
        Self::new(items, settings)
    }
}

impl Workspace for DemoWorkspace {
    fn items(&self) -> Vec<ItemRecord> {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn settings(&self) -> RunSettings {
        self.settings.clone()
    }

    fn relayout(&self) {
        let depth = self.settings.device.bed_depth;
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        for item in items.iter_mut().filter(|i| i.depth_span > depth) {
            tracing::info!(
                item = %item.id,
                from = item.depth_span,
                to = depth,
                "Re-arranging item",
            );
            item.depth_span = depth;
        }
    }
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// Scene that records state changes to the log instead of drawing.
pub struct LogScene {
    view: Mutex<View>,
    next_alert: AtomicU64,
}

impl LogScene {
    pub fn new() -> Self {
        Self {
            view: Mutex::new(View::Arrange),
            next_alert: AtomicU64::new(1),
        }
    }
}

impl Default for LogScene {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneHost for LogScene {
    fn view(&self) -> View {
        *self.view.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_view(&self, view: View) {
        *self.view.lock().unwrap_or_else(|e| e.into_inner()) = view;
        tracing::debug!(?view, "View changed");
    }

    fn screenshot(&self) -> Option<Vec<u8>> {
        None
    }

    fn clear_stacks(&self) {
        tracing::debug!("Stacks cleared");
    }

    fn create_stack(&self, id: &str) {
        tracing::debug!(stack = id, "Stack created");
    }

    fn render_item(&self, output: &ItemOutput) -> Duration {
        let started = Instant::now();
        tracing::info!(item = %output.item, layers = output.layers, "Rendered item");
        started.elapsed()
    }

    fn add_layers(&self, stack: &str, layers: Vec<LayerData>) {
        tracing::info!(stack, layers = layers.len(), "Added preview layers");
    }

    fn show_alert(&self, text: &str, dismiss: Option<Duration>) -> u64 {
        let handle = self.next_alert.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(handle, ?dismiss, "{text}");
        handle
    }

    fn hide_alert(&self, handle: u64) {
        tracing::debug!(handle, "Alert hidden");
    }

    fn update_speed_range(&self, range: Option<(f64, f64)>) {
        match range {
            Some((min, max)) => tracing::info!(min, max, "Speed legend updated"),
            None => tracing::debug!("Speed legend cleared"),
        }
    }
}

// ---------------------------------------------------------------------------
// Exporter
// ---------------------------------------------------------------------------

/// Writes the settings a run was exported with as pretty JSON.
pub struct JsonExporter {
    path: PathBuf,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    exported_at: chrono::DateTime<chrono::Utc>,
    settings: &'a RunSettings,
}

impl JsonExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Exporter for JsonExporter {
    async fn export(&self, settings: &RunSettings) -> anyhow::Result<()> {
        let document = ExportDocument {
            exported_at: chrono::Utc::now(),
            settings,
        };
        let body = serde_json::to_vec_pretty(&document)?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), "Export written");
        Ok(())
    }
}
