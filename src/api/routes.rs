//! Route Configuration

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/messages", get(handlers::list_messages))
        .route("/send", post(handlers::send_message))
        .route("/register-server", post(handlers::register_server))
        .route("/unregister-server", post(handlers::unregister_server))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
