use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::profile::user_timezone;
use crate::models::action::Action;
use crate::models::daily_log::{
    AdjustCountRequest, AdjustCountResponse, DailyLog, DailyLogQuery, SetCountRequest,
};
use crate::services::events::{self, SyncEvent};
use crate::services::{dates, scoring};
use crate::AppState;

const MAX_RANGE_DAYS: i64 = 366;

enum CountUpdate {
    Set(i32),
    Step(scoring::CountStep),
}

/// Today in the user's timezone, and the requested date checked against the
/// log window.
async fn resolve_log_date(
    state: &AppState,
    user_id: Uuid,
    requested: Option<NaiveDate>,
) -> AppResult<NaiveDate> {
    let tz = user_timezone(state, user_id).await?;
    let today = dates::today_in(tz, Utc::now());
    let date = requested.unwrap_or(today);
    dates::ensure_within_window(date, today, state.config.log_window_days)?;
    Ok(date)
}

/// Find-or-create the (action, date) row and apply `update` under a row lock.
///
/// The action row is share-locked for the whole write, so the points
/// multiplier cannot change underneath it, and the log row always exists
/// before it is locked, so concurrent first writes queue on the same row.
/// Returns the written log and the action as seen inside the transaction.
async fn write_count(
    state: &AppState,
    user_id: Uuid,
    action_id: Uuid,
    date: NaiveDate,
    update: CountUpdate,
) -> AppResult<(DailyLog, Action)> {
    let mut tx = state.db.begin().await?;

    let action = sqlx::query_as::<_, Action>(
        "SELECT * FROM actions WHERE id = $1 AND user_id = $2 FOR SHARE",
    )
    .bind(action_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Action not found".into()))?;

    sqlx::query(
        r#"
        INSERT INTO daily_logs (id, user_id, action_id, count, points, log_date)
        VALUES ($1, $2, $3, 0, 0, $4)
        ON CONFLICT (action_id, log_date) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(action_id)
    .bind(date)
    .execute(&mut *tx)
    .await?;

    let existing = sqlx::query_as::<_, DailyLog>(
        r#"
        SELECT * FROM daily_logs
        WHERE action_id = $1 AND log_date = $2
        FOR UPDATE
        "#,
    )
    .bind(action_id)
    .bind(date)
    .fetch_one(&mut *tx)
    .await?;

    let previous = existing.count;
    let count = match update {
        CountUpdate::Set(n) => n,
        CountUpdate::Step(step) => scoring::next_count(previous, step),
    };
    let points = scoring::points_for(action.progress_points, count);

    let log = sqlx::query_as::<_, DailyLog>(
        r#"
        UPDATE daily_logs SET count = $2, points = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(existing.id)
    .bind(count)
    .bind(points)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(
        user_id = %user_id,
        action_id = %action_id,
        date = %date,
        previous,
        count,
        "Daily count written"
    );
    events::publish(
        state.ws_tx.as_ref(),
        SyncEvent::DailyLogChanged {
            user_id,
            action_id,
            date,
        },
    );

    Ok((log, action))
}

pub async fn list_daily_logs(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<DailyLogQuery>,
) -> AppResult<Json<Vec<DailyLog>>> {
    let (start, end) = match (query.date, query.start_date, query.end_date) {
        (Some(date), _, _) => (date, date),
        (None, None, None) => {
            let tz = user_timezone(&state, auth_user.id).await?;
            let today = dates::today_in(tz, Utc::now());
            (today, today)
        }
        (None, start, end) => {
            let tz = user_timezone(&state, auth_user.id).await?;
            let today = dates::today_in(tz, Utc::now());
            let end = end.unwrap_or(today);
            let start = match start {
                Some(start) => start,
                None => dates::days_before(end, 6)?,
            };
            (start, end)
        }
    };

    if start > end {
        return Err(AppError::Validation("start_date must not be after end_date".into()));
    }
    if (end - start).num_days() > MAX_RANGE_DAYS {
        return Err(AppError::Validation(format!(
            "Date range may span at most {} days",
            MAX_RANGE_DAYS
        )));
    }

    let logs = sqlx::query_as::<_, DailyLog>(
        r#"
        SELECT * FROM daily_logs
        WHERE user_id = $1 AND log_date BETWEEN $2 AND $3
        ORDER BY log_date ASC, created_at ASC
        "#,
    )
    .bind(auth_user.id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(logs))
}

pub async fn set_count(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<SetCountRequest>,
) -> AppResult<Json<DailyLog>> {
    if body.count < 0 {
        return Err(AppError::Validation("Count must not be negative".into()));
    }
    let date = resolve_log_date(&state, auth_user.id, body.date).await?;

    let (log, _) =
        write_count(&state, auth_user.id, body.action_id, date, CountUpdate::Set(body.count)).await?;
    Ok(Json(log))
}

pub async fn adjust_count(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<AdjustCountRequest>,
) -> AppResult<Json<AdjustCountResponse>> {
    let date = resolve_log_date(&state, auth_user.id, body.date).await?;

    let (log, action) =
        write_count(&state, auth_user.id, body.action_id, date, CountUpdate::Step(body.step)).await?;

    let milestone = scoring::milestone(body.step, log.count, action.target_count);
    let is_complete = scoring::is_complete(log.count, action.target_count);

    Ok(Json(AdjustCountResponse {
        log,
        milestone,
        is_complete,
    }))
}

pub async fn delete_daily_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(log_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let deleted = sqlx::query_as::<_, DailyLog>(
        "DELETE FROM daily_logs WHERE id = $1 AND user_id = $2 RETURNING *",
    )
    .bind(log_id)
    .bind(auth_user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Daily log not found".into()))?;

    events::publish(
        state.ws_tx.as_ref(),
        SyncEvent::DailyLogChanged {
            user_id: auth_user.id,
            action_id: deleted.action_id,
            date: deleted.date,
        },
    );

    Ok(Json(serde_json::json!({ "deleted": true, "id": log_id })))
}
