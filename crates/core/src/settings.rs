//! Immutable per-run settings snapshot.
//!
//! A [`RunSettings`] value is captured from the workspace when a stage
//! starts and shared read-only (behind an `Arc`) with every handler and
//! engine call in that run. Nothing mutates it afterwards; values that
//! are derived per run (the belt anchor, the preview variant) are stamped
//! into a fresh copy via the `with_*` builders before it is shared.

use serde::{Deserialize, Serialize};

use crate::types::PreviewMode;

/// The kind of machine the output is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    /// Fused-filament printing.
    #[default]
    Fdm,
    /// Resin printing. Slicing always continues into Preview.
    Sla,
    /// Subtractive milling.
    Cam,
    /// Laser cutting / engraving.
    Laser,
}

impl DeviceMode {
    /// Modes whose sliced output is displayed as toolpaths rather than
    /// shells.
    pub const fn is_toolpath(self) -> bool {
        matches!(self, Self::Cam | Self::Laser)
    }
}

/// Machine description relevant to orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Whether the bed is an endless belt.
    pub belt: bool,
    /// Bed depth (Y extent) in millimetres.
    pub bed_depth: f64,
    /// Preview variants offered by this device, in cycling order.
    pub preview_modes: Vec<PreviewMode>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            belt: false,
            bed_depth: 300.0,
            preview_modes: vec![PreviewMode::Speed],
        }
    }
}

/// Process parameters that affect orchestration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessSettings {
    /// Lead distance of the first layer on a belt bed.
    pub first_layer_belt_lead: f64,
    /// Purge tower footprint (area); zero disables the tower.
    pub purge_tower: f64,
}

/// Settings snapshot for a single run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSettings {
    pub mode: DeviceMode,
    pub device: DeviceSettings,
    pub process: ProcessSettings,
    /// Belt anchor computed for this run; `None` off-belt.
    pub belt_anchor: Option<f64>,
    /// Preview variant the engine should render, set for Preview runs.
    pub preview_mode: Option<PreviewMode>,
}

impl RunSettings {
    pub fn with_belt_anchor(mut self, anchor: Option<f64>) -> Self {
        self.belt_anchor = anchor;
        self
    }

    pub fn with_preview_mode(mut self, mode: PreviewMode) -> Self {
        self.preview_mode = Some(mode);
        self
    }

    /// Preview variants offered, never empty.
    pub fn preview_modes(&self) -> &[PreviewMode] {
        if self.device.preview_modes.is_empty() {
            &[PreviewMode::Speed]
        } else {
            &self.device.preview_modes
        }
    }
}
