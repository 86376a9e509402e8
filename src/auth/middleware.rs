use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::jwt::{verify_token_of, TokenType};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::AppState;

/// The signed-in user, inserted as a request extension by [`require_auth`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Only access tokens identify a caller; refresh tokens are for `/api/auth/refresh`.
pub fn authenticate(token: &str, config: &Config) -> AppResult<AuthUser> {
    let claims = verify_token_of(token, TokenType::Access, config)?;
    Ok(AuthUser {
        id: claims.sub,
        email: claims.email,
    })
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or(AppError::Unauthorized)?;
    let auth_user = authenticate(token, &state.config)?;

    req.extensions_mut().insert(auth_user);
    Ok(next.run(req).await)
}
