use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::auth::middleware::AuthUser;
use crate::error::AppResult;
use crate::handlers::actions::list_owned_actions;
use crate::handlers::profile::user_timezone;
use crate::models::daily_log::DailyLog;
use crate::services::{dates, scoring};
use crate::AppState;

const DEFAULT_TREND_DAYS: u32 = 7;
const MAX_TREND_DAYS: u32 = 90;

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    pub days: Option<u32>,
    pub end: Option<NaiveDate>,
}

async fn logs_between(
    state: &AppState,
    user_id: uuid::Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<Vec<DailyLog>> {
    let logs = sqlx::query_as::<_, DailyLog>(
        r#"
        SELECT * FROM daily_logs
        WHERE user_id = $1 AND log_date BETWEEN $2 AND $3
        "#,
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;
    Ok(logs)
}

/// Score for a day against the day before it.
pub async fn get_summary(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<SummaryQuery>,
) -> AppResult<Json<scoring::ScoreSummary>> {
    let tz = user_timezone(&state, auth_user.id).await?;
    let date = query.date.unwrap_or_else(|| dates::today_in(tz, Utc::now()));
    let previous = dates::days_before(date, 1)?;

    let actions = list_owned_actions(&state.db, auth_user.id).await?;
    let logs = logs_between(&state, auth_user.id, previous, date).await?;
    let (today_logs, previous_logs): (Vec<DailyLog>, Vec<DailyLog>) =
        logs.into_iter().partition(|l| l.date == date);

    Ok(Json(scoring::summarize(
        date,
        &actions,
        &today_logs,
        &previous_logs,
    )))
}

/// Rolling per-day score trend, oldest day first.
pub async fn get_weekly_trend(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<TrendQuery>,
) -> AppResult<Json<scoring::WeeklyTrend>> {
    let tz = user_timezone(&state, auth_user.id).await?;
    let today = dates::today_in(tz, Utc::now());
    let n = query.days.unwrap_or(DEFAULT_TREND_DAYS).clamp(1, MAX_TREND_DAYS);
    let end = query.end.unwrap_or(today);

    let days = dates::days_ending(end, n);
    let start = days.first().copied().unwrap_or(end);
    let logs = logs_between(&state, auth_user.id, start, end).await?;

    Ok(Json(scoring::weekly_trend(&days, today, &logs)))
}
