use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tipster::{
    api, autosave,
    config::AppConfig,
    mirror::{JsonFilePublisher, MirrorOutbox},
    state::{AppState, Backends},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tipster=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting tipster...");

    let config = AppConfig::from_env();

    let mut state = AppState::with_backends(config.contest.clone(), Backends::in_memory());
    if let Some(path) = &config.snapshot_file {
        let publisher = Arc::new(JsonFilePublisher::new(path.clone()));
        state = state.with_outbox(MirrorOutbox::spawn(publisher, config.mirror_debounce));
        tracing::info!("Publishing contest snapshots to {}", path.display());
    }
    let state = Arc::new(state);

    if let Some(path) = &config.state_file {
        if path.exists() {
            match state.load_from_file(path).await {
                Ok(()) => tracing::info!("Restored state from {}", path.display()),
                Err(e) => tracing::warn!("Could not restore state from {}: {}", path.display(), e),
            }
        }
        autosave::spawn_state_autosaver(state.clone(), path.clone(), autosave::AUTOSAVE_INTERVAL);
    }

    let app = api::router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
