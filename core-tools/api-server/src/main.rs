// Cadence HTTP API
// Serves conversations over REST on the configured host and port

use cadence_api::{router, AppState};
use cadence_engine::config::Config;
use cadence_engine::conversation::ConversationLoop;
use cadence_engine::participants::DetachedHuman;
use cadence_engine::secrets::SecretStore;
use cadence_engine::session::{InMemorySessionStore, SessionManager};
use cadence_engine::telemetry::init_telemetry_with_level;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var_os("CADENCE_CONFIG") {
        Some(path) => Config::load_from_path(Path::new(&path))?,
        None => Config::load_or_create()?,
    };
    init_telemetry_with_level(&config.core.log_level);

    tracing::info!("Cadence API v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Default LLM provider: {}", config.llm.default_provider);

    let engine =
        ConversationLoop::from_config(&config, Arc::new(DetachedHuman), SecretStore::new());
    let sessions = Arc::new(SessionManager::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(engine),
    ));
    let app = router(AppState::new(sessions), &config.api.cors_origins);

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
