pub mod rag;

pub mod types;

use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, routing::get};
use tower_http::cors::CorsLayer;

use crate::{config::AppConfig, pipeline::RagPipeline};

pub use rag::rag_routes;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// `None` when embedding settings are incomplete.
    pub pipeline: Option<RagPipeline>,
}

pub fn app_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .merge(rag_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[inline]
async fn health() -> &'static str {
    "ok"
}
