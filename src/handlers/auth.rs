use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    jwt::{create_token_pair, hash_token, verify_token_of, TokenPair, TokenType},
    middleware::AuthUser,
    password::{generate_confirmation_code, hash_password, verify_password},
    rate_limit::CONFIRM_PER_ACCOUNT,
};
use crate::error::{AppError, AppResult};
use crate::handlers::profile::load_profile;
use crate::models::user::{Me, User};
use crate::services::dates;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 254, message = "Email too long"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    /// IANA timezone identifier. Defaults to the server's configured zone.
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6, message = "Confirmation code must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendCodeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub email: String,
    pub confirmation_required: bool,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn store_refresh_token(
    db: &sqlx::PgPool,
    user_id: Uuid,
    raw_refresh_token: &str,
    ttl_secs: i64,
    parent_token_id: Option<Uuid>,
) -> AppResult<Uuid> {
    let token_hash = hash_token(raw_refresh_token);
    let expires_at = Utc::now() + Duration::seconds(ttl_secs);
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, parent_token_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(&token_hash)
    .bind(expires_at)
    .bind(parent_token_id)
    .execute(db)
    .await?;

    Ok(id)
}

/// Create a token pair AND persist the refresh token hash in the DB.
async fn issue_token_pair(
    db: &sqlx::PgPool,
    user_id: Uuid,
    email: &str,
    config: &crate::config::Config,
    parent_token_id: Option<Uuid>,
) -> AppResult<TokenPair> {
    let tokens = create_token_pair(user_id, email, config)?;
    store_refresh_token(
        db,
        user_id,
        &tokens.refresh_token,
        config.jwt_refresh_ttl_secs,
        parent_token_id,
    )
    .await?;
    Ok(tokens)
}

async fn revoke_all_user_tokens(db: &sqlx::PgPool, user_id: Uuid) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = true, revoked_at = NOW()
        WHERE user_id = $1 AND revoked = false
        "#,
    )
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(())
}

/// Store a fresh confirmation code for the user. Codes are delivered
/// out-of-band; this deployment writes them to the log.
async fn issue_confirmation_code(state: &AppState, user_id: Uuid, email: &str) -> AppResult<()> {
    let code = generate_confirmation_code();
    let expires_at = Utc::now() + Duration::seconds(state.config.confirmation_code_ttl_secs);

    sqlx::query(
        r#"
        UPDATE users SET
            confirmation_code_hash = $2,
            confirmation_expires_at = $3,
            confirmation_attempts = 0,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(hash_token(&code))
    .bind(expires_at)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %user_id, email = %email, code = %code, "Confirmation code issued");
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<RegisterResponse>> {
    body.validate()?;
    let email = normalize_email(&body.email);

    let timezone = match body.timezone.as_deref() {
        Some(tz) => {
            dates::parse_timezone(tz)?;
            tz.to_string()
        }
        None => state.config.default_timezone.clone(),
    };

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = $1")
        .bind(&email)
        .fetch_one(&state.db)
        .await?;

    if existing > 0 {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let pwd_hash = hash_password(&body.password)?;
    let user_id = Uuid::new_v4();

    let mut tx = state.db.begin().await?;
    sqlx::query("INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(&email)
        .bind(&pwd_hash)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO user_profiles (user_id, timezone) VALUES ($1, $2)")
        .bind(user_id)
        .bind(&timezone)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    issue_confirmation_code(&state, user_id, &email).await?;

    Ok(Json(RegisterResponse {
        user_id,
        email,
        confirmation_required: true,
    }))
}

/// Wrong codes allowed before the current code is burned.
pub const MAX_CONFIRMATION_ATTEMPTS: i32 = 5;

const INVALID_CODE: &str = "Invalid or expired confirmation code";

#[derive(Debug, PartialEq, Eq)]
enum CodeCheck {
    Accepted,
    /// `burn` when this failure used up the last attempt.
    Rejected { burn: bool },
    AlreadyConfirmed,
}

fn check_confirmation_code(user: &User, code: &str, now: DateTime<Utc>) -> CodeCheck {
    if user.confirmed {
        return CodeCheck::AlreadyConfirmed;
    }
    let live = user.confirmation_expires_at.is_some_and(|exp| exp > now)
        && user.confirmation_attempts < MAX_CONFIRMATION_ATTEMPTS;
    let Some(stored) = user.confirmation_code_hash.as_deref().filter(|_| live) else {
        return CodeCheck::Rejected { burn: false };
    };
    if stored == hash_token(code) {
        CodeCheck::Accepted
    } else {
        CodeCheck::Rejected {
            burn: user.confirmation_attempts + 1 >= MAX_CONFIRMATION_ATTEMPTS,
        }
    }
}

/// Confirm a sign-up and sign the user in. Tokens are only issued here for an
/// account this request confirmed.
pub async fn confirm(
    State(state): State<AppState>,
    Json(body): Json<ConfirmRequest>,
) -> AppResult<Json<TokenPair>> {
    body.validate()?;
    let email = normalize_email(&body.email);

    if state
        .rate_limiter
        .check(&format!("confirm:{}", email), CONFIRM_PER_ACCOUNT)
        .await
        .is_err()
    {
        tracing::warn!(email = %email, "Confirmation attempts throttled for account");
        return Err(AppError::RateLimited);
    }

    let mut tx = state.db.begin().await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1 FOR UPDATE")
        .bind(&email)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::Validation(INVALID_CODE.into()))?;

    match check_confirmation_code(&user, &body.code, Utc::now()) {
        CodeCheck::AlreadyConfirmed => {
            tracing::warn!(user_id = %user.id, "Confirm attempted on a confirmed account");
            Err(AppError::Validation(INVALID_CODE.into()))
        }
        CodeCheck::Rejected { burn } => {
            sqlx::query(
                r#"
                UPDATE users SET
                    confirmation_attempts = confirmation_attempts + 1,
                    confirmation_code_hash = CASE WHEN $2 THEN NULL ELSE confirmation_code_hash END,
                    confirmation_expires_at = CASE WHEN $2 THEN NULL ELSE confirmation_expires_at END,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(user.id)
            .bind(burn)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            if burn {
                tracing::warn!(user_id = %user.id, "Confirmation code burned after repeated failures");
            }
            Err(AppError::Validation(INVALID_CODE.into()))
        }
        CodeCheck::Accepted => {
            sqlx::query(
                r#"
                UPDATE users SET
                    confirmed = true,
                    confirmation_code_hash = NULL,
                    confirmation_expires_at = NULL,
                    confirmation_attempts = 0,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            tracing::info!(user_id = %user.id, "Account confirmed");
            let tokens = issue_token_pair(&state.db, user.id, &user.email, &state.config, None).await?;
            Ok(Json(tokens))
        }
    }
}

pub async fn resend_code(
    State(state): State<AppState>,
    Json(body): Json<ResendCodeRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let email = normalize_email(&body.email);

    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE email = $1 AND confirmed = false",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await?;

    // Same response either way so the endpoint doesn't reveal accounts
    if let Some(user) = user {
        issue_confirmation_code(&state, user.id, &user.email).await?;
    }

    Ok(Json(serde_json::json!({
        "message": "If the account exists and is unconfirmed, a new code was sent"
    })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenPair>> {
    body.validate()?;
    let email = normalize_email(&body.email);

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    if !user.confirmed {
        return Err(AppError::NotConfirmed);
    }

    let tokens = issue_token_pair(&state.db, user.id, &user.email, &state.config, None).await?;
    Ok(Json(tokens))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let claims = verify_token_of(&body.refresh_token, TokenType::Refresh, &state.config)?;

    let token_hash = hash_token(&body.refresh_token);

    let (stored_id, stored_user_id, revoked) = sqlx::query_as::<_, (Uuid, Uuid, bool)>(
        r#"
        SELECT id, user_id, revoked
        FROM refresh_tokens
        WHERE token_hash = $1
        "#,
    )
    .bind(&token_hash)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::Unauthorized)?;

    // A revoked token presented again means the family leaked
    if revoked {
        tracing::warn!(
            user_id = %stored_user_id,
            token_id = %stored_id,
            "Refresh token reuse detected, revoking all tokens for user"
        );
        revoke_all_user_tokens(&state.db, stored_user_id).await?;
        return Err(AppError::Unauthorized);
    }

    if stored_user_id != claims.sub {
        return Err(AppError::Unauthorized);
    }

    // Single-use rotation
    sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = true, revoked_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(stored_id)
    .execute(&state.db)
    .await?;

    let tokens = issue_token_pair(
        &state.db,
        claims.sub,
        &claims.email,
        &state.config,
        Some(stored_id),
    )
    .await?;
    Ok(Json(tokens))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<serde_json::Value>> {
    revoke_all_user_tokens(&state.db, auth_user.id).await?;
    tracing::debug!(user_id = %auth_user.id, "Signed out");
    Ok(Json(serde_json::json!({ "message": "Logged out successfully" })))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Me>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth_user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;

    let profile = load_profile(&state, auth_user.id).await?;

    Ok(Json(Me {
        id: user.id,
        email: user.email,
        confirmed: user.confirmed,
        profile,
        created_at: user.created_at,
    }))
}
