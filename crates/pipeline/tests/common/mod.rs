#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kiln_core::config::OrchestratorConfig;
use kiln_core::settings::RunSettings;
use kiln_core::types::{ItemId, Stage};
use kiln_core::workset::{ItemRecord, WorkItem};
use kiln_engine::{
    ComputeEngine, EngineError, FinalizeEvent, FinalizeReply, ItemEvent, ItemOutput, LayerData,
};
use kiln_events::{EventBus, PipelineEvent, RunEvent};
use kiln_pipeline::{Exporter, Orchestrator, SceneHost, View, Workspace};
use tokio::sync::{broadcast, mpsc};

// ---------------------------------------------------------------------------
// Scripted engine
// ---------------------------------------------------------------------------

fn progress(fraction: f64, phase: &str) -> ItemEvent {
    ItemEvent::Progress {
        fraction,
        phase: Some(phase.to_string()),
        alert: None,
    }
}

/// Engine that answers from scripts, synchronously at submission.
///
/// Unscripted items report `0.5 layer`, `1.0 support`, then complete.
/// Hanging items and stages keep their channel open until the session
/// is reset, which keeps the engine busy.
#[derive(Default)]
pub struct ScriptedEngine {
    item_scripts: Mutex<HashMap<ItemId, Vec<ItemEvent>>>,
    finalize_scripts: Mutex<HashMap<Stage, Vec<FinalizeEvent>>>,
    hang_items: Mutex<HashSet<ItemId>>,
    hang_stages: Mutex<HashSet<Stage>>,
    pending_items: Mutex<Vec<mpsc::UnboundedSender<ItemEvent>>>,
    pending_stages: Mutex<Vec<mpsc::UnboundedSender<FinalizeEvent>>>,
    pub submitted: Mutex<Vec<ItemId>>,
    pub finalized: Mutex<Vec<Stage>>,
    pub seen_settings: Mutex<Vec<Arc<RunSettings>>>,
    pub resets: AtomicUsize,
    pub cache_clears: AtomicUsize,
    /// Report a busy session even with nothing pending.
    pub held_busy: AtomicBool,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_item(self, id: &str, events: Vec<ItemEvent>) -> Self {
        self.item_scripts
            .lock()
            .unwrap()
            .insert(ItemId::new(id), events);
        self
    }

    /// `id` fails after some progress and then emits a stray update.
    pub fn fail_item(self, id: &str, message: &str) -> Self {
        self.script_item(
            id,
            vec![
                progress(0.3, "layer"),
                ItemEvent::Complete(Err(EngineError::Failed(message.to_string()))),
                progress(0.9, "layer"),
            ],
        )
    }

    pub fn hang_item(self, id: &str) -> Self {
        self.hang_items.lock().unwrap().insert(ItemId::new(id));
        self
    }

    pub fn fail_finalize(self, stage: Stage, message: &str) -> Self {
        self.finalize_scripts.lock().unwrap().insert(
            stage,
            vec![FinalizeEvent::Complete(Err(EngineError::Failed(
                message.to_string(),
            )))],
        );
        self
    }

    pub fn hang_finalize(&self, stage: Stage) {
        self.hang_stages.lock().unwrap().insert(stage);
    }

    pub fn hold_busy(&self) {
        self.held_busy.store(true, Ordering::SeqCst);
    }

    pub fn submitted_ids(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|id| id.to_string())
            .collect()
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    fn default_finalize(stage: Stage) -> Vec<FinalizeEvent> {
        match stage {
            Stage::Preview => vec![
                FinalizeEvent::LayerProgress {
                    fraction: 0.5,
                    phase: Some("prepare".into()),
                    layer: Some(LayerData {
                        index: 0,
                        payload: serde_json::json!({ "z": 0.2 }),
                    }),
                },
                FinalizeEvent::LayerProgress {
                    fraction: 1.0,
                    phase: Some("prepare".into()),
                    layer: Some(LayerData {
                        index: 1,
                        payload: serde_json::json!({ "z": 0.4 }),
                    }),
                },
                FinalizeEvent::Complete(Ok(FinalizeReply {
                    max_metric: Some(150.0),
                    min_metric: Some(20.0),
                })),
            ],
            Stage::Slice | Stage::Export => {
                vec![FinalizeEvent::Complete(Ok(FinalizeReply::default()))]
            }
        }
    }
}

impl ComputeEngine for ScriptedEngine {
    fn submit_item(
        &self,
        item: &WorkItem,
        settings: Arc<RunSettings>,
    ) -> mpsc::UnboundedReceiver<ItemEvent> {
        self.submitted.lock().unwrap().push(item.id.clone());
        self.seen_settings.lock().unwrap().push(settings);

        let (tx, rx) = mpsc::unbounded_channel();
        if self.hang_items.lock().unwrap().contains(&item.id) {
            let _ = tx.send(progress(0.1, "layer"));
            self.pending_items.lock().unwrap().push(tx);
            return rx;
        }

        let events = self
            .item_scripts
            .lock()
            .unwrap()
            .get(&item.id)
            .cloned()
            .unwrap_or_else(|| {
                vec![
                    progress(0.5, "layer"),
                    progress(1.0, "support"),
                    ItemEvent::Complete(Ok(ItemOutput {
                        item: item.id.clone(),
                        layers: 3,
                    })),
                ]
            });
        for event in events {
            let _ = tx.send(event);
        }
        rx
    }

    fn finalize_stage(
        &self,
        stage: Stage,
        _settings: Arc<RunSettings>,
    ) -> mpsc::UnboundedReceiver<FinalizeEvent> {
        self.finalized.lock().unwrap().push(stage);

        let (tx, rx) = mpsc::unbounded_channel();
        if self.hang_stages.lock().unwrap().contains(&stage) {
            self.pending_stages.lock().unwrap().push(tx);
            return rx;
        }

        let events = self
            .finalize_scripts
            .lock()
            .unwrap()
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| Self::default_finalize(stage));
        for event in events {
            let _ = tx.send(event);
        }
        rx
    }

    fn reset_session(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.pending_items.lock().unwrap().clear();
        self.pending_stages.lock().unwrap().clear();
    }

    fn is_session_busy(&self) -> bool {
        self.held_busy.load(Ordering::SeqCst)
            || !self.pending_items.lock().unwrap().is_empty()
            || !self.pending_stages.lock().unwrap().is_empty()
    }

    fn clear_cache(&self) {
        self.cache_clears.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Recording scene
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SceneLog {
    pub view: View,
    pub views: Vec<View>,
    pub alerts: Vec<(String, Option<Duration>)>,
    pub hidden_alerts: Vec<u64>,
    pub stacks: Vec<String>,
    pub stack_clears: usize,
    pub rendered: Vec<ItemId>,
    pub layers: Vec<(String, usize)>,
    pub speed_ranges: Vec<Option<(f64, f64)>>,
    pub screenshots: usize,
}

type Hook = Box<dyn FnOnce() + Send>;

pub struct RecordingScene {
    pub log: Mutex<SceneLog>,
    hooks: Mutex<HashMap<String, Hook>>,
}

impl RecordingScene {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(SceneLog {
                view: View::Arrange,
                views: Vec::new(),
                alerts: Vec::new(),
                hidden_alerts: Vec::new(),
                stacks: Vec::new(),
                stack_clears: 0,
                rendered: Vec::new(),
                layers: Vec::new(),
                speed_ranges: Vec::new(),
                screenshots: 0,
            }),
            hooks: Mutex::new(HashMap::new()),
        }
    }

    /// Run `hook` once, the first time the scene receives `call`
    /// (`"render_item"`, or `"create_stack:<id>"`).
    pub fn on_call(&self, call: &str, hook: impl FnOnce() + Send + 'static) {
        self.hooks
            .lock()
            .unwrap()
            .insert(call.to_string(), Box::new(hook));
    }

    fn fire(&self, call: &str) {
        let hook = self.hooks.lock().unwrap().remove(call);
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl SceneHost for RecordingScene {
    fn view(&self) -> View {
        self.log.lock().unwrap().view
    }

    fn set_view(&self, view: View) {
        let mut log = self.log.lock().unwrap();
        log.view = view;
        log.views.push(view);
    }

    fn screenshot(&self) -> Option<Vec<u8>> {
        let mut log = self.log.lock().unwrap();
        log.screenshots += 1;
        Some(vec![0x89, b'P', b'N', b'G'])
    }

    fn clear_stacks(&self) {
        let mut log = self.log.lock().unwrap();
        log.stacks.clear();
        log.stack_clears += 1;
    }

    fn create_stack(&self, id: &str) {
        self.log.lock().unwrap().stacks.push(id.to_string());
        self.fire(&format!("create_stack:{id}"));
    }

    fn render_item(&self, output: &ItemOutput) -> Duration {
        self.log.lock().unwrap().rendered.push(output.item.clone());
        self.fire("render_item");
        Duration::from_millis(2)
    }

    fn add_layers(&self, stack: &str, layers: Vec<LayerData>) {
        self.log
            .lock()
            .unwrap()
            .layers
            .push((stack.to_string(), layers.len()));
    }

    fn show_alert(&self, text: &str, dismiss: Option<Duration>) -> u64 {
        let mut log = self.log.lock().unwrap();
        log.alerts.push((text.to_string(), dismiss));
        log.alerts.len() as u64
    }

    fn hide_alert(&self, handle: u64) {
        self.log.lock().unwrap().hidden_alerts.push(handle);
    }

    fn update_speed_range(&self, range: Option<(f64, f64)>) {
        self.log.lock().unwrap().speed_ranges.push(range);
    }
}

// ---------------------------------------------------------------------------
// In-memory workspace and exporter
// ---------------------------------------------------------------------------

pub struct MemoryWorkspace {
    pub items: Mutex<Vec<ItemRecord>>,
    pub settings: Mutex<RunSettings>,
    pub relayouts: AtomicUsize,
}

impl MemoryWorkspace {
    pub fn new(items: Vec<ItemRecord>, settings: RunSettings) -> Self {
        Self {
            items: Mutex::new(items),
            settings: Mutex::new(settings),
            relayouts: AtomicUsize::new(0),
        }
    }
}

impl Workspace for MemoryWorkspace {
    fn items(&self) -> Vec<ItemRecord> {
        self.items.lock().unwrap().clone()
    }

    fn settings(&self) -> RunSettings {
        self.settings.lock().unwrap().clone()
    }

    fn relayout(&self) {
        self.relayouts.fetch_add(1, Ordering::SeqCst);
        let depth = self.settings.lock().unwrap().device.bed_depth;
        for item in self.items.lock().unwrap().iter_mut() {
            item.depth_span = item.depth_span.min(depth);
        }
    }
}

#[derive(Default)]
pub struct RecordingExporter {
    pub calls: AtomicUsize,
    pub failure: Option<String>,
    pub seen_settings: Mutex<Vec<RunSettings>>,
}

#[async_trait]
impl Exporter for RecordingExporter {
    async fn export(&self, settings: &RunSettings) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_settings.lock().unwrap().push(settings.clone());
        match &self.failure {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub engine: Arc<ScriptedEngine>,
    pub scene: Arc<RecordingScene>,
    pub workspace: Arc<MemoryWorkspace>,
    pub exporter: Arc<RecordingExporter>,
    events: broadcast::Receiver<RunEvent>,
}

impl Harness {
    pub fn new(engine: ScriptedEngine, items: Vec<ItemRecord>, settings: RunSettings) -> Self {
        Self::with_exporter(engine, items, settings, RecordingExporter::default())
    }

    pub fn with_exporter(
        engine: ScriptedEngine,
        items: Vec<ItemRecord>,
        settings: RunSettings,
        exporter: RecordingExporter,
    ) -> Self {
        let engine = Arc::new(engine);
        let scene = Arc::new(RecordingScene::new());
        let workspace = Arc::new(MemoryWorkspace::new(items, settings));
        let exporter = Arc::new(exporter);
        let bus = Arc::new(EventBus::default());
        let events = bus.subscribe();

        let orchestrator = Arc::new(Orchestrator::new(
            OrchestratorConfig::default(),
            engine.clone(),
            scene.clone(),
            workspace.clone(),
            exporter.clone(),
            bus,
        ));

        Self {
            orchestrator,
            engine,
            scene,
            workspace,
            exporter,
            events,
        }
    }

    /// Events published since the last call, in order.
    pub fn drain_events(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event.event);
        }
        events
    }
}

/// Items with the given costs, all eligible.
pub fn items(costs: &[(&str, u64)]) -> Vec<ItemRecord> {
    costs
        .iter()
        .map(|(id, cost)| ItemRecord::new(*id, *cost))
        .collect()
}

pub fn progress_values(events: &[PipelineEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress { value, .. } => Some(*value),
            _ => None,
        })
        .collect()
}

pub fn error_events(events: &[PipelineEvent]) -> Vec<(Stage, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Error { stage, message } => Some((*stage, message.clone())),
            _ => None,
        })
        .collect()
}

/// Let spawned tasks run until the engine holds work in flight.
pub async fn wait_until_busy(engine: &ScriptedEngine) {
    for _ in 0..100 {
        if engine.is_session_busy() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("engine never became busy");
}
