//! HTTP surface: a single webhook route

pub mod webhook;

use axum::{Router, extract::DefaultBodyLimit, routing::post};

use crate::SharedState;
pub use webhook::handle_webhook;

/// Build the router serving `POST <listen.url>`.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route(&state.config.listen_url_path, post(handle_webhook))
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .with_state(state)
}
