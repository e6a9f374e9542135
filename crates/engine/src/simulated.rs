//! In-process engine with timed progress.
//!
//! [`SimulatedEngine`] spawns one task per submission that reports a fixed
//! number of progress ticks and then completes. Every task runs under the
//! current session's cancellation token (a child of the engine's master
//! token), so [`ComputeEngine::reset_session`] aborts everything in flight.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kiln_core::settings::RunSettings;
use kiln_core::types::{ItemId, PreviewMode, Stage};
use kiln_core::workset::WorkItem;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::{ComputeEngine, FinalizeEvent, FinalizeReply, ItemEvent, ItemOutput, LayerData};
use crate::error::EngineError;

/// Metric range reported by a speed preview, in mm/s.
const SPEED_RANGE: (f64, f64) = (20.0, 150.0);

/// Timing and failure injection for [`SimulatedEngine`].
#[derive(Debug, Clone)]
pub struct SimulatedEngineConfig {
    /// Delay between progress ticks.
    pub tick: Duration,
    /// Progress ticks per item and per finalize step.
    pub ticks: u32,
    /// Layers produced per item.
    pub layers_per_item: u32,
    /// Item that fails halfway through slicing.
    pub fail_item: Option<ItemId>,
}

impl Default for SimulatedEngineConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(20),
            ticks: 5,
            layers_per_item: 10,
            fail_item: None,
        }
    }
}

struct Session {
    id: Uuid,
    cancel: CancellationToken,
}

/// Decrements the in-flight count when a task ends, however it ends.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SimulatedEngine {
    config: SimulatedEngineConfig,
    /// Master token; cancelled when the engine is dropped.
    master: CancellationToken,
    session: Mutex<Session>,
    in_flight: Arc<AtomicUsize>,
    /// Items whose geometry has been synced since the last cache clear.
    synced: Mutex<HashSet<ItemId>>,
}

impl SimulatedEngine {
    pub fn new(config: SimulatedEngineConfig) -> Self {
        let master = CancellationToken::new();
        let session = Session {
            id: Uuid::now_v7(),
            cancel: master.child_token(),
        };
        Self {
            config,
            master,
            session: Mutex::new(session),
            in_flight: Arc::new(AtomicUsize::new(0)),
            synced: Mutex::new(HashSet::new()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session.lock().unwrap_or_else(|e| e.into_inner()).id
    }

    /// Number of items synced since the last [`ComputeEngine::clear_cache`].
    pub fn synced_items(&self) -> usize {
        self.synced.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn session_token(&self) -> CancellationToken {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel
            .clone()
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new(SimulatedEngineConfig::default())
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        self.master.cancel();
    }
}

impl ComputeEngine for SimulatedEngine {
    fn submit_item(
        &self,
        item: &WorkItem,
        _settings: Arc<RunSettings>,
    ) -> mpsc::UnboundedReceiver<ItemEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.session_token();
        let guard = InFlight::enter(&self.in_flight);
        let config = self.config.clone();
        let id = item.id.clone();
        let fails = config.fail_item.as_ref() == Some(&id);

        self.synced
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone());

        tokio::spawn(async move {
            let _guard = guard;
            let ticks = config.ticks.max(1);
            for step in 1..=ticks {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = tx.send(ItemEvent::Complete(Err(EngineError::SessionReset)));
                        return;
                    }
                    _ = tokio::time::sleep(config.tick) => {}
                }
                if fails && step * 2 > ticks {
                    tracing::debug!(item_id = %id, "Simulated item failure");
                    let _ = tx.send(ItemEvent::Complete(Err(EngineError::Failed(format!(
                        "Unable to slice {id}: mesh is not manifold"
                    )))));
                    return;
                }
                let phase = if step * 2 <= ticks { "layer" } else { "support" };
                let _ = tx.send(ItemEvent::Progress {
                    fraction: f64::from(step) / f64::from(ticks),
                    phase: Some(phase.to_string()),
                    alert: None,
                });
            }
            let _ = tx.send(ItemEvent::Complete(Ok(ItemOutput {
                item: id,
                layers: config.layers_per_item,
            })));
        });

        rx
    }

    fn finalize_stage(
        &self,
        stage: Stage,
        settings: Arc<RunSettings>,
    ) -> mpsc::UnboundedReceiver<FinalizeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.session_token();
        let guard = InFlight::enter(&self.in_flight);
        let config = self.config.clone();
        let layers = match stage {
            Stage::Preview => config.layers_per_item,
            Stage::Slice | Stage::Export => 0,
        };

        tokio::spawn(async move {
            let _guard = guard;
            let ticks = config.ticks.max(1);
            let mut emitted = 0;
            for step in 1..=ticks {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = tx.send(FinalizeEvent::Complete(Err(EngineError::SessionReset)));
                        return;
                    }
                    _ = tokio::time::sleep(config.tick) => {}
                }
                let due = layers * step / ticks;
                while emitted < due {
                    let _ = tx.send(FinalizeEvent::LayerProgress {
                        fraction: f64::from(step) / f64::from(ticks),
                        phase: Some("prepare".to_string()),
                        layer: Some(LayerData {
                            index: emitted,
                            payload: serde_json::json!({ "z": f64::from(emitted) * 0.2 }),
                        }),
                    });
                    emitted += 1;
                }
                let _ = tx.send(FinalizeEvent::LayerProgress {
                    fraction: f64::from(step) / f64::from(ticks),
                    phase: Some("prepare".to_string()),
                    layer: None,
                });
            }
            let reply = match (stage, settings.preview_mode) {
                (Stage::Preview, Some(PreviewMode::Speed)) => FinalizeReply {
                    min_metric: Some(SPEED_RANGE.0),
                    max_metric: Some(SPEED_RANGE.1),
                },
                _ => FinalizeReply::default(),
            };
            let _ = tx.send(FinalizeEvent::Complete(Ok(reply)));
        });

        rx
    }

    fn reset_session(&self) {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        session.cancel.cancel();
        let previous = session.id;
        *session = Session {
            id: Uuid::now_v7(),
            cancel: self.master.child_token(),
        };
        tracing::info!(previous = %previous, session_id = %session.id, "Engine session reset");
    }

    fn is_session_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    fn clear_cache(&self) {
        let mut synced = self.synced.lock().unwrap_or_else(|e| e.into_inner());
        tracing::debug!(count = synced.len(), "Clearing engine cache");
        synced.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
