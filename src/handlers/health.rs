use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "kinisi-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Ready once the database answers. Also reports live-feed subscribers.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .is_ok();

    let subscribers = state
        .ws_tx
        .as_ref()
        .map(|tx| tx.receiver_count())
        .unwrap_or(0);

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if db_ok { "ready" } else { "not_ready" },
            "checks": { "database": if db_ok { "ok" } else { "failed" } },
            "live_subscribers": subscribers,
        })),
    )
}
