pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::automation::handlers;
use crate::state::AppState;

/// Resumes are uploaded with the start-run form.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/runs",
            post(handlers::handle_start_run).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/v1/runs/current", get(handlers::handle_run_status))
        .route("/api/v1/runs/current/stop", post(handlers::handle_stop_run))
        .with_state(state)
}
