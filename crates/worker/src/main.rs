use std::sync::Arc;

use kiln_core::config::OrchestratorConfig;
use kiln_core::types::ProgressRange;
use kiln_engine::SimulatedEngine;
use kiln_events::EventBus;
use kiln_pipeline::Orchestrator;
use kiln_worker::config::WorkerConfig;
use kiln_worker::host::{DemoWorkspace, JsonExporter, LogScene};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiln_worker=info,kiln_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = OrchestratorConfig::from_env()?;
    let worker = WorkerConfig::from_env()?;
    tracing::info!(
        target_stage = %worker.target,
        mode = ?worker.device_mode,
        belt = worker.belt,
        export_path = %worker.export_path.display(),
        "Worker starting",
    );

    let bus = Arc::new(EventBus::default());
    let orchestrator = Arc::new(Orchestrator::new(
        config,
        Arc::new(SimulatedEngine::new(worker.engine_config())),
        Arc::new(LogScene::new()),
        Arc::new(DemoWorkspace::sample(worker.device_mode, worker.belt)),
        Arc::new(JsonExporter::new(&worker.export_path)),
        Arc::clone(&bus),
    ));

    // --- Event log ---
    let mut events = orchestrator.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tracing::debug!(
                        event_type = %event.event_type(),
                        payload = %event.to_json(),
                        "Event",
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // --- Run ---
    let target = worker.target;
    let mut run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.request_stage(target, ProgressRange::FULL, false).await }
    });

    let result = tokio::select! {
        joined = &mut run => joined?,
        () = shutdown_signal() => {
            orchestrator.cancel();
            run.await?
        }
    };

    match result {
        Ok(outcome) => {
            tracing::info!(outcome = %serde_json::to_string(&outcome)?, "Run finished");
        }
        Err(err) => {
            tracing::error!(error = %err, "Run failed");
        }
    }

    drop(orchestrator);
    drop(bus);
    logger.await?;

    tracing::info!("Worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), cancelling run");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, cancelling run");
        }
    }
}
