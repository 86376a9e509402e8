use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub confirmed: bool,
    #[serde(skip_serializing)]
    pub confirmation_code_hash: Option<String>,
    #[serde(skip_serializing)]
    pub confirmation_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub confirmation_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub timezone: String,
    pub theme: Theme,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sound_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "theme_preference", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    Auto,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    pub timezone: Option<String>,
    pub theme: Option<Theme>,
    #[validate(length(max = 100, message = "Display name too long"))]
    pub display_name: Option<String>,
    #[validate(length(max = 100, message = "First name too long"))]
    pub first_name: Option<String>,
    #[validate(length(max = 100, message = "Last name too long"))]
    pub last_name: Option<String>,
    pub sound_enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct Me {
    pub id: Uuid,
    pub email: String,
    pub confirmed: bool,
    pub profile: UserProfile,
    pub created_at: DateTime<Utc>,
}
