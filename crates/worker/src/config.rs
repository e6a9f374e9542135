use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use kiln_core::settings::DeviceMode;
use kiln_core::types::{ItemId, Stage};
use kiln_engine::SimulatedEngineConfig;

/// Runner configuration loaded from environment variables.
///
/// Orchestrator tuning lives in `OrchestratorConfig::from_env`; this
/// covers what the standalone runner adds on top.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Where the exporter writes its JSON output.
    pub export_path: PathBuf,
    /// Stage requested at startup.
    pub target: Stage,
    /// Device mode of the demo workspace.
    pub device_mode: DeviceMode,
    /// Whether the demo device has a belt bed.
    pub belt: bool,
    /// Delay between simulated engine progress ticks.
    pub engine_tick: Duration,
    /// Item the simulated engine fails, for exercising the error path.
    pub fail_item: Option<ItemId>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default              |
    /// |-----------------------|----------------------|
    /// | `KILN_EXPORT_PATH`    | `kiln-export.json`   |
    /// | `KILN_TARGET`         | `export`             |
    /// | `KILN_DEVICE_MODE`    | `fdm`                |
    /// | `KILN_BELT`           | `false`              |
    /// | `KILN_ENGINE_TICK_MS` | `20`                 |
    /// | `KILN_FAIL_ITEM`      | unset                |
    pub fn from_env() -> anyhow::Result<Self> {
        let export_path = std::env::var("KILN_EXPORT_PATH")
            .unwrap_or_else(|_| "kiln-export.json".into())
            .into();

        let target =
            parse_stage(&std::env::var("KILN_TARGET").unwrap_or_else(|_| "export".into()))?;

        let device_mode =
            parse_device_mode(&std::env::var("KILN_DEVICE_MODE").unwrap_or_else(|_| "fdm".into()))?;

        let belt: bool = std::env::var("KILN_BELT")
            .unwrap_or_else(|_| "false".into())
            .trim()
            .parse()
            .context("KILN_BELT must be true or false")?;

        let tick_ms: u64 = std::env::var("KILN_ENGINE_TICK_MS")
            .unwrap_or_else(|_| "20".into())
            .trim()
            .parse()
            .context("KILN_ENGINE_TICK_MS must be a valid u64")?;

        let fail_item = std::env::var("KILN_FAIL_ITEM")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(ItemId::new);

        Ok(Self {
            export_path,
            target,
            device_mode,
            belt,
            engine_tick: Duration::from_millis(tick_ms),
            fail_item,
        })
    }

    pub fn engine_config(&self) -> SimulatedEngineConfig {
        SimulatedEngineConfig {
            tick: self.engine_tick,
            fail_item: self.fail_item.clone(),
            ..Default::default()
        }
    }
}

fn parse_stage(raw: &str) -> anyhow::Result<Stage> {
    Stage::ALL
        .into_iter()
        .find(|stage| stage.name().eq_ignore_ascii_case(raw.trim()))
        .with_context(|| format!("KILN_TARGET must be slice, preview or export, got {raw:?}"))
}

fn parse_device_mode(raw: &str) -> anyhow::Result<DeviceMode> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase()))
        .with_context(|| format!("KILN_DEVICE_MODE has an invalid value: {raw:?}"))
}
