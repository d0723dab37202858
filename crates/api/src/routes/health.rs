//! Liveness endpoint

use axum::extract::State;
use axum::Json;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database_ok = sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .is_ok();

    Json(serde_json::json!({
        "status": if database_ok { "ok" } else { "degraded" },
        "database": database_ok,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
