//! HTTP routes

pub mod billing;
pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/billing/subscription", get(billing::get_subscription))
        .route("/api/billing/subscription/plan", post(billing::change_plan))
        .route(
            "/api/billing/subscription/interval",
            post(billing::change_interval),
        )
        .route(
            "/api/billing/subscription/cancel",
            post(billing::cancel_subscription),
        )
        .route(
            "/api/billing/subscription/resume",
            post(billing::resume_subscription),
        )
        .with_state(state)
}
