use anyhow::{Context, Result};
use lpr_service::{
    api, artifacts::ArtifactWriter, offline, CollaboratorSet, LprServiceState, PlatePipeline,
    RecordStore, ServiceConfig,
};
use telemetry::LogConfig;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServiceConfig::from_env()?;
    let _logging = telemetry::init_structured_logging(
        LogConfig::new("lpr-service").with_node_id(config.node_id.clone()),
    );

    info!("Starting LPR Service...");
    info!(
        bind = %config.bind_addr,
        node_id = %config.node_id,
        results = %config.results_path.display(),
        save_crops = config.save_crops,
        "LPR Service configuration loaded"
    );

    let mut collaborators = CollaboratorSet::replay();
    collaborators.init_all(&serde_json::Value::Null).await?;

    let store = RecordStore::open(&config.results_path).context("Failed to open record store")?;
    let artifacts = if config.save_crops {
        Some(ArtifactWriter::new(&config.vehicle_dir, &config.plate_dir)?)
    } else {
        None
    };
    let pipeline = PlatePipeline::new(config.pipeline.clone())?;

    let state = LprServiceState::new(
        config.node_id.clone(),
        pipeline,
        collaborators,
        store,
        artifacts,
    );

    if let Some(replay_file) = &config.replay_file {
        info!(file = %replay_file.display(), "Running offline replay");
        let result = offline::run_replay_file(&state, replay_file).await;
        state.shutdown().await?;
        result?;
        return Ok(());
    }

    let app = api::router(state.clone());

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("LPR Service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: LprServiceState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
    if let Err(e) = state.shutdown().await {
        error!("Error during shutdown: {}", e);
    }
}
