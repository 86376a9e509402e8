use axum::{extract::State, Extension, Json};
use chrono_tz::Tz;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::AppResult;
use crate::models::user::{UpdateProfileRequest, UserProfile};
use crate::services::dates;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TimezoneOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// Profile row for the user, created with defaults on first access.
pub async fn load_profile(state: &AppState, user_id: Uuid) -> AppResult<UserProfile> {
    sqlx::query(
        r#"
        INSERT INTO user_profiles (user_id, timezone)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(&state.config.default_timezone)
    .execute(&state.db)
    .await?;

    let profile = sqlx::query_as::<_, UserProfile>("SELECT * FROM user_profiles WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.db)
        .await?;

    Ok(profile)
}

/// The timezone a user's counts are bucketed in.
pub async fn user_timezone(state: &AppState, user_id: Uuid) -> AppResult<Tz> {
    let tz_name = sqlx::query_scalar::<_, String>(
        "SELECT timezone FROM user_profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?
    .unwrap_or_else(|| state.config.default_timezone.clone());

    let fallback = dates::timezone_or_default(&state.config.default_timezone, chrono_tz::UTC);
    Ok(dates::timezone_or_default(&tz_name, fallback))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(load_profile(&state, auth_user.id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserProfile>> {
    body.validate()?;
    if let Some(tz) = body.timezone.as_deref() {
        dates::parse_timezone(tz)?;
    }

    // Make sure the row exists before the partial update
    load_profile(&state, auth_user.id).await?;

    let profile = sqlx::query_as::<_, UserProfile>(
        r#"
        UPDATE user_profiles SET
            timezone = COALESCE($2, timezone),
            theme = COALESCE($3, theme),
            display_name = COALESCE($4, display_name),
            first_name = COALESCE($5, first_name),
            last_name = COALESCE($6, last_name),
            sound_enabled = COALESCE($7, sound_enabled),
            updated_at = NOW()
        WHERE user_id = $1
        RETURNING *
        "#,
    )
    .bind(auth_user.id)
    .bind(&body.timezone)
    .bind(body.theme)
    .bind(&body.display_name)
    .bind(&body.first_name)
    .bind(&body.last_name)
    .bind(body.sound_enabled)
    .fetch_one(&state.db)
    .await?;

    tracing::debug!(user_id = %auth_user.id, timezone = %profile.timezone, "Profile updated");
    Ok(Json(profile))
}

pub async fn list_timezones() -> Json<Vec<TimezoneOption>> {
    Json(
        dates::COMMON_TIMEZONES
            .iter()
            .map(|(value, label)| TimezoneOption { value, label })
            .collect(),
    )
}
