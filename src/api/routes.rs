use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Scheduler triggers
        .route("/api/cron/sync", post(handlers::cron_sync))
        .route("/api/cron/lock", post(handlers::cron_lock))
        // Prediction submission (lock-gated)
        .route("/api/predictions", post(handlers::submit_prediction))
        // Administrative entry points
        .route("/api/admin/matches/:id/result", post(handlers::enter_match_result))
        .route("/api/admin/matches/:id/lock", post(handlers::set_match_lock))
        .route("/api/admin/slips/:id/settle", post(handlers::settle_slip))
        // Rankings
        .route("/api/rankings", get(handlers::rankings))
        // Liveness
        .route("/health", get(handlers::health))
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
