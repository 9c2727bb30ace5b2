//! HTTP API handlers and routing.

pub mod error;
mod health;
mod webhook;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use webhook::REQUEST_ID_HEADER;

/// Create the router serving the webhook and health endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(webhook::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
