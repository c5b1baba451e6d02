use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{extract::FromRequestParts, Json};
use axum_extra::extract::CookieJar;
use serde_json::json;
use tracing::warn;

use crate::db::{get_api_token_by_value, get_session, now, DbPool};
use crate::error::AppError;
use crate::AppState;

/// The user behind a request authenticated via session cookie or API token.
pub struct Auth {
    pub user_id: i64,
}

/// The user behind a request authenticated via session cookie only (no API tokens).
pub struct SessionAuth {
    pub user_id: i64,
}

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user_id) = check_session(parts, &state.db)? {
            return Ok(Auth { user_id });
        }

        if let Some(user_id) = check_bearer_token(parts, &state.db)? {
            return Ok(Auth { user_id });
        }

        warn!("Unauthorized API access attempt");
        Err(AuthError::Unauthorized)
    }
}

impl FromRequestParts<AppState> for SessionAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user_id) = check_session(parts, &state.db)? {
            return Ok(SessionAuth { user_id });
        }

        Err(AuthError::Unauthorized)
    }
}

fn check_session(parts: &Parts, db: &DbPool) -> Result<Option<i64>, AppError> {
    let jar = CookieJar::from_headers(&parts.headers);
    let Some(cookie) = jar.get("session") else {
        return Ok(None);
    };

    Ok(get_session(db, cookie.value())?
        .filter(|session| session.expires_at > now())
        .map(|session| session.user_id))
}

/// The raw bearer token of a request, if it carries one.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn check_bearer_token(parts: &Parts, db: &DbPool) -> Result<Option<i64>, AppError> {
    match bearer_token(&parts.headers) {
        Some(token) => Ok(get_api_token_by_value(db, token)?.map(|t| t.user_id)),
        None => Ok(None),
    }
}

pub enum AuthError {
    Unauthorized,
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized", "message": "Unauthorized" })),
            )
                .into_response(),
            AuthError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": msg, "message": msg })),
            )
                .into_response(),
        }
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Unauthorized => AuthError::Unauthorized,
            other => AuthError::Internal(other.to_string()),
        }
    }
}
