pub mod handlers;
pub mod types;

use crate::{Result, assistant::Assistant, config::ServerConfig};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::net::SocketAddr;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

/// Builds the HTTP surface. In-flight queries are cancelled once `shutdown`
/// turns `true`.
pub fn router(
    assistant: Assistant,
    max_body_bytes: usize,
    shutdown: watch::Receiver<bool>,
) -> Router {
    let app_state = handlers::AppState {
        assistant,
        shutdown,
    };

    Router::new()
        .route("/ask", post(handlers::ask))
        .route("/health", get(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .with_state(app_state)
}

pub async fn run(config: &ServerConfig, assistant: Assistant) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = router(assistant, config.max_body_bytes, shutdown_rx);

    let addr = SocketAddr::new(config.host.parse()?, config.port);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down, cancelling in-flight queries");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}
