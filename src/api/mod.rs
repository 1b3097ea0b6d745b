pub mod handlers;
pub mod types;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::AccountPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AccountPipeline>,
}

pub fn router(pipeline: Arc<AccountPipeline>) -> Router {
    let state = Arc::new(AppState { pipeline });

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/networks", get(handlers::list_networks))
        .route("/api/v1/accounts/{address}", get(handlers::discover))
        .route(
            "/api/v1/accounts/{address}/timeline",
            get(handlers::timeline),
        )
        .route("/api/v1/accounts/{address}/summary", get(handlers::summary))
        .route(
            "/api/v1/accounts/{address}/networks/{network_id}/flow",
            get(handlers::flow_graph),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(pipeline: Arc<AccountPipeline>, host: &str, port: u16) -> eyre::Result<()> {
    let app = router(pipeline);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
