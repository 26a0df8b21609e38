use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dumdoors::{api, broadcast, config::AppConfig, doors, metrics::Metrics, scoring, state::AppState};

#[tokio::main]
async fn main() {
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
                .unwrap_or_else(|_| "dumdoors=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DumDoors...");

    let config = AppConfig::from_env();
    let scorer: Arc<dyn scoring::Scorer> = match scoring::build_scorer(&config) {
        Ok(scorer) => scorer,
        Err(e) => {
            tracing::warn!(
                "Failed to initialize AI scoring: {}. Falling back to local scoring.",
                e
            );
            Arc::new(scoring::HeuristicScorer)
        }
    };

    let generator = match doors::build_door_generator(&config) {
        Ok(generator) => generator,
        Err(e) => {
            tracing::warn!(
                "Failed to initialize AI door generation: {}. Using local scenarios.",
                e
            );
            None
        }
    };

    let port = config.port;
    let mut state = AppState::new(config, scorer, Arc::new(Metrics::new()));
    if let Some(generator) = generator {
        state = state.with_door_generator(generator);
    }
    let state = Arc::new(state);

    // Drops idle connection entries and expired cached doors
    broadcast::spawn_connection_reaper(state.clone());

    let app = api::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("Listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
