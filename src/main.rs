use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dux::{create_router, AppState, Config};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Optional: DUX_LISTEN_ADDR (default: 0.0.0.0:3000)");
            eprintln!("Optional: DUX_POKE_API_URL, DUX_TODOS_API_URL");
            eprintln!("Optional: DUX_KEEP_UNUSED_SECS (default: 60)");
            eprintln!("Optional: DUX_SWEEP_INTERVAL_SECS (default: 10)");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting dux");
    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Poke API: {}", config.poke_api_url);
    tracing::info!("Todos API: {}", config.todos_api_url);
    tracing::info!(
        "Unused queries kept for {:?}, swept every {:?}",
        config.keep_unused_for,
        config.sweep_interval
    );

    // Compose the store and mount the cache sweeper
    let state = AppState::new(&config);
    let sweeper = state.spawn_cache_sweeper(&config);

    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server running at http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    sweeper.abort();
    tracing::info!("Shut down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
