//! hubsub_http
//!
//! Control-plane REST API: topic lifecycle management and observability
//! endpoints, served next to the WebSocket listener. Route composition is
//! centralized here to keep the binary small and the router testable.

pub mod api;
pub mod error;
pub mod types;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use hubsub_broker::Broker;

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/topics",
            axum::routing::get(api::list_topics).post(api::create_topic),
        )
        .route("/topics/:name", axum::routing::delete(api::delete_topic))
        .route("/health", axum::routing::get(api::health))
        .route("/stats", axum::routing::get(api::stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
