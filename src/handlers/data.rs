use axum::{extract::State, Extension, Json};
use serde::Serialize;

use crate::auth::middleware::AuthUser;
use crate::error::AppResult;
use crate::services::events::{self, SyncEvent};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ClearDataResponse {
    pub deleted_logs: u64,
    pub deleted_actions: u64,
}

/// Delete every log, then every action, owned by the user. Account and
/// profile are kept.
pub async fn clear_all_data(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<ClearDataResponse>> {
    let mut tx = state.db.begin().await?;

    let deleted_logs = sqlx::query("DELETE FROM daily_logs WHERE user_id = $1")
        .bind(auth_user.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let deleted_actions = sqlx::query("DELETE FROM actions WHERE user_id = $1")
        .bind(auth_user.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    tracing::info!(
        user_id = %auth_user.id,
        deleted_logs,
        deleted_actions,
        "User data cleared"
    );
    events::publish(
        state.ws_tx.as_ref(),
        SyncEvent::DataCleared {
            user_id: auth_user.id,
        },
    );

    Ok(Json(ClearDataResponse {
        deleted_logs,
        deleted_actions,
    }))
}
