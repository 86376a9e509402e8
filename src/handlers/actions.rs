use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::profile::user_timezone;
use crate::models::action::{
    Action, ActionQuery, CreateActionRequest, HistoryQuery, UpdateActionRequest,
};
use crate::models::daily_log::DailyLog;
use crate::services::events::{self, ChangeOp, SyncEvent};
use crate::services::{dates, scoring};
use crate::AppState;

const MAX_HISTORY_DAYS: u32 = 366;

pub(crate) async fn fetch_owned_action(
    db: &sqlx::PgPool,
    user_id: Uuid,
    action_id: Uuid,
) -> AppResult<Action> {
    sqlx::query_as::<_, Action>("SELECT * FROM actions WHERE id = $1 AND user_id = $2")
        .bind(action_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("Action not found".into()))
}

pub(crate) async fn list_owned_actions(db: &sqlx::PgPool, user_id: Uuid) -> AppResult<Vec<Action>> {
    let actions = sqlx::query_as::<_, Action>(
        r#"
        SELECT * FROM actions
        WHERE user_id = $1
        ORDER BY order_index ASC, created_at ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(actions)
}

pub async fn list_actions(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ActionQuery>,
) -> AppResult<Json<Vec<Action>>> {
    let actions = list_owned_actions(&state.db, auth_user.id)
        .await?
        .into_iter()
        .filter(|a| query.matches(a))
        .collect();
    Ok(Json(actions))
}

pub async fn get_action(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(action_id): Path<Uuid>,
) -> AppResult<Json<Action>> {
    Ok(Json(fetch_owned_action(&state.db, auth_user.id, action_id).await?))
}

pub async fn create_action(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateActionRequest>,
) -> AppResult<Json<Action>> {
    body.validate()?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Action name is required".into()));
    }

    let frequency = body.frequency.unwrap_or_default();
    let target_count = frequency.effective_target(body.target_count.unwrap_or(1));

    let next_order = sqlx::query_scalar::<_, Option<i32>>(
        "SELECT MAX(order_index) FROM actions WHERE user_id = $1",
    )
    .bind(auth_user.id)
    .fetch_one(&state.db)
    .await?
    .map(|max| max + 1)
    .unwrap_or(0);

    let action = sqlx::query_as::<_, Action>(
        r#"
        INSERT INTO actions (id, user_id, name, description, action_type, progress_points, target_count, frequency, time_of_day, order_index)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(name)
    .bind(description_update(body.description.as_deref()).flatten())
    .bind(body.action_type.unwrap_or_default())
    .bind(body.progress_points.unwrap_or(1))
    .bind(target_count)
    .bind(frequency)
    .bind(body.time_of_day.unwrap_or_default())
    .bind(next_order)
    .fetch_one(&state.db)
    .await?;

    tracing::debug!(user_id = %auth_user.id, action_id = %action.id, "Action created");
    events::publish(
        state.ws_tx.as_ref(),
        SyncEvent::ActionChanged {
            user_id: auth_user.id,
            action_id: action.id,
            op: ChangeOp::Created,
        },
    );

    Ok(Json(action))
}

/// `Some(None)` clears the description; a blank value counts as clearing.
fn description_update(description: Option<&str>) -> Option<Option<String>> {
    description.map(|d| Some(d.trim()).filter(|d| !d.is_empty()).map(str::to_string))
}

pub async fn update_action(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(action_id): Path<Uuid>,
    Json(body): Json<UpdateActionRequest>,
) -> AppResult<Json<Action>> {
    body.validate()?;

    let name = match body.name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::Validation("Action name is required".into())),
        other => other,
    };
    let description = description_update(body.description.as_deref());

    // Row lock held until the log points below are rewritten
    let mut tx = state.db.begin().await?;
    let existing = sqlx::query_as::<_, Action>(
        "SELECT * FROM actions WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(action_id)
    .bind(auth_user.id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Action not found".into()))?;

    let frequency = body.frequency.unwrap_or(existing.frequency);
    let target_count = frequency.effective_target(body.target_count.unwrap_or(existing.target_count));

    let action = sqlx::query_as::<_, Action>(
        r#"
        UPDATE actions SET
            name = COALESCE($3, name),
            description = CASE WHEN $4 THEN $5 ELSE description END,
            action_type = COALESCE($6, action_type),
            progress_points = COALESCE($7, progress_points),
            target_count = $8,
            frequency = $9,
            time_of_day = COALESCE($10, time_of_day),
            completed = COALESCE($11, completed),
            completed_at = CASE
                WHEN $11 IS NULL THEN completed_at
                WHEN $11 AND NOT completed THEN NOW()
                WHEN $11 THEN completed_at
                ELSE NULL
            END,
            order_index = COALESCE($12, order_index),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(action_id)
    .bind(auth_user.id)
    .bind(name)
    .bind(description.is_some())
    .bind(description.flatten())
    .bind(body.action_type)
    .bind(body.progress_points)
    .bind(target_count)
    .bind(frequency)
    .bind(body.time_of_day)
    .bind(body.completed)
    .bind(body.order_index)
    .fetch_one(&mut *tx)
    .await?;

    // Stored points follow the action's current value
    if action.progress_points != existing.progress_points {
        let rewritten = sqlx::query(
            r#"
            UPDATE daily_logs SET points = count * $2, updated_at = NOW()
            WHERE action_id = $1
            "#,
        )
        .bind(action_id)
        .bind(action.progress_points)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tracing::debug!(action_id = %action_id, rewritten, "Log points recomputed");
    }

    tx.commit().await?;

    events::publish(
        state.ws_tx.as_ref(),
        SyncEvent::ActionChanged {
            user_id: auth_user.id,
            action_id,
            op: ChangeOp::Updated,
        },
    );

    Ok(Json(action))
}

pub async fn delete_action(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(action_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    // Logs go with the action (ON DELETE CASCADE)
    let result = sqlx::query("DELETE FROM actions WHERE id = $1 AND user_id = $2")
        .bind(action_id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Action not found".into()));
    }

    events::publish(
        state.ws_tx.as_ref(),
        SyncEvent::ActionChanged {
            user_id: auth_user.id,
            action_id,
            op: ChangeOp::Deleted,
        },
    );

    Ok(Json(serde_json::json!({ "deleted": true, "id": action_id })))
}

pub async fn action_history(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(action_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<scoring::ActionHistory>> {
    let action = fetch_owned_action(&state.db, auth_user.id, action_id).await?;
    let tz = user_timezone(&state, auth_user.id).await?;
    let today = dates::today_in(tz, Utc::now());

    let window = query
        .days
        .unwrap_or(scoring::DEFAULT_HISTORY_DAYS)
        .clamp(1, MAX_HISTORY_DAYS);
    let end = query.end.unwrap_or(today).min(today);
    let start = dates::days_before(end, window as i64 - 1)?;

    let logs = sqlx::query_as::<_, DailyLog>(
        r#"
        SELECT * FROM daily_logs
        WHERE action_id = $1 AND user_id = $2 AND log_date BETWEEN $3 AND $4
        "#,
    )
    .bind(action_id)
    .bind(auth_user.id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(scoring::action_history(&action, end, window, today, &logs)))
}
