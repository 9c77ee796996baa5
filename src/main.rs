use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use fra_insight::analysis::{AnalysisPipeline, Assistant};
use fra_insight::api::{build_router, AppState};
use fra_insight::fleet::{FleetCache, InMemoryStore, RemoteStore, RestStore};
use fra_insight::llm::{client::ChatModelClient, ModelClient};
use fra_insight::report::ReportGenerator;
use fra_insight::{logging, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FRA_CONFIG").ok())
        .map(PathBuf::from);

    let config = Config::load(config_path.as_deref()).context("loading configuration")?;
    logging::init(&config.logging)?;

    info!("Starting fra-insight v{}", env!("CARGO_PKG_VERSION"));

    let model: Arc<dyn ModelClient> = Arc::new(
        ChatModelClient::new(config.llm.clone()).context("building model client")?,
    );
    let pipeline = Arc::new(AnalysisPipeline::new(Arc::clone(&model), &config.analysis));
    let reports = Arc::new(ReportGenerator::new(config.report.clone())?);

    let cache = FleetCache::load(&config.storage.fleet_cache_path).await?;
    let store: Arc<dyn RemoteStore> = match &config.storage.url {
        Some(_) => Arc::new(RestStore::new(&config.storage)?),
        None => {
            warn!("No storage URL configured, using in-memory store seeded from the fleet cache");
            Arc::new(InMemoryStore::with_transformers(cache.all().to_vec()))
        }
    };
    let fleet = Arc::new(RwLock::new(cache));

    let state = AppState::new(
        Arc::clone(&pipeline),
        Assistant::new(model),
        reports,
        store,
        Arc::clone(&fleet),
    );
    let app = build_router(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pipeline.shutdown();
    if let Err(e) = fleet.read().await.persist().await {
        error!("Failed to persist fleet cache on shutdown: {}", e);
    }
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
