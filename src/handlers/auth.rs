use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{generate_session_id, generate_token, hash_password, verify_password};
use crate::db::{
    create_api_token, create_session, create_user, delete_api_token, delete_api_token_by_value,
    delete_session, get_password_hash, get_user, get_user_credentials, list_api_tokens, now,
    update_user,
};
use crate::error::{AppError, FieldErrors};
use crate::middleware::{bearer_token, Auth, SessionAuth};
use crate::models::{
    ApiToken, CreateApiToken, LoginRequest, LoginResponse, ProfileUpdated, RegisterRequest,
    Session, UpdateProfile, User,
};
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_FIELD_LEN: usize = 255;

fn check_name(errors: &mut FieldErrors, name: &str) {
    if name.is_empty() {
        errors.add("name", "The name field is required.");
    } else if name.chars().count() > MAX_FIELD_LEN {
        errors.add("name", "The name may not be greater than 255 characters.");
    }
}

fn check_email(errors: &mut FieldErrors, email: &str) {
    if !email.contains('@') {
        errors.add("email", "The email must be a valid email address.");
    } else if email.chars().count() > MAX_FIELD_LEN {
        errors.add("email", "The email may not be greater than 255 characters.");
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let name = req.name.trim();
    let email = req.email.trim().to_lowercase();

    let mut errors = FieldErrors::new();
    check_name(&mut errors, name);
    check_email(&mut errors, &email);
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        errors.add("password", "The password must be at least 8 characters.");
    }
    errors.into_result()?;

    let password_hash = hash_password(&req.password)?;
    let user = create_user(&state.db, name, &email, &password_hash)?;
    info!(user_id = user.id, "Registered user");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let email = req.email.trim().to_lowercase();
    let Some((user, password_hash)) = get_user_credentials(&state.db, &email)? else {
        return Err(AppError::Unauthorized);
    };
    if !verify_password(&req.password, &password_hash) {
        return Err(AppError::Unauthorized);
    }

    let session_id = generate_session_id();
    let now = now();
    let session = Session {
        id: session_id.clone(),
        user_id: user.id,
        created_at: now,
        expires_at: now + state.session_days * 24 * 60 * 60,
    };
    create_session(&state.db, &session)?;

    let token = create_api_token(&state.db, user.id, &generate_token(), Some("login"))?;
    info!(user_id = user.id, "User logged in");

    let cookie = Cookie::build(("session", session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::days(state.session_days));

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            token: token.token,
            user,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, impl IntoResponse), AppError> {
    if let Some(session_cookie) = jar.get("session") {
        delete_session(&state.db, session_cookie.value())?;
    }
    if let Some(token) = bearer_token(&headers) {
        delete_api_token_by_value(&state.db, token)?;
    }
    info!("User logged out");

    let cookie = Cookie::build(("session", ""))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(0));

    Ok((jar.remove(cookie), Json(json!({ "success": true }))))
}

pub async fn current_user(
    auth: Auth,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    match get_user(&state.db, auth.user_id)? {
        Some(user) => Ok(Json(user)),
        None => Err(AppError::Unauthorized),
    }
}

/// Updates name, email and password of the caller. A new password needs the current one
/// and a matching confirmation.
pub async fn update_profile(
    auth: Auth,
    State(state): State<AppState>,
    Json(req): Json<UpdateProfile>,
) -> Result<Json<ProfileUpdated>, AppError> {
    let name = req.name.as_deref().map(str::trim);
    let email = req.email.as_deref().map(|e| e.trim().to_lowercase());

    let mut errors = FieldErrors::new();
    if let Some(name) = name {
        check_name(&mut errors, name);
    }
    if let Some(email) = &email {
        check_email(&mut errors, email);
    }
    if let Some(password) = &req.password {
        if password.chars().count() < MIN_PASSWORD_LEN {
            errors.add("password", "The password must be at least 8 characters.");
        }
        if req.password_confirmation.as_deref() != Some(password.as_str()) {
            errors.add("password", "The password confirmation does not match.");
        }
        if req.current_password.is_none() {
            errors.add(
                "current_password",
                "The current password is required to change the password.",
            );
        }
    }
    errors.into_result()?;

    if let Some(current) = &req.current_password {
        let stored = get_password_hash(&state.db, auth.user_id)?.ok_or(AppError::Unauthorized)?;
        if !verify_password(current, &stored) {
            warn!(user_id = auth.user_id, "Rejected profile update with wrong password");
            return Err(AppError::Validation(FieldErrors::single(
                "current_password",
                "The current password is incorrect.",
            )));
        }
    }

    let password_hash = req.password.as_deref().map(hash_password).transpose()?;
    let user = update_user(
        &state.db,
        auth.user_id,
        name,
        email.as_deref(),
        password_hash.as_deref(),
    )?;
    info!(
        user_id = user.id,
        password_changed = password_hash.is_some(),
        "Updated profile"
    );

    Ok(Json(ProfileUpdated {
        message: "Profile updated.".to_string(),
        user,
    }))
}

pub async fn list_tokens(
    auth: SessionAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<ApiToken>>, AppError> {
    let tokens = list_api_tokens(&state.db, auth.user_id)?;
    Ok(Json(tokens))
}

pub async fn create_token(
    auth: SessionAuth,
    State(state): State<AppState>,
    Json(req): Json<CreateApiToken>,
) -> Result<Json<ApiToken>, AppError> {
    let token_value = generate_token();
    let token = create_api_token(&state.db, auth.user_id, &token_value, req.name.as_deref())?;
    info!(user_id = auth.user_id, name = ?req.name, "Created API token");
    Ok(Json(token))
}

pub async fn revoke_token(
    auth: SessionAuth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if delete_api_token(&state.db, auth.user_id, id)? {
        info!(id, "Revoked API token");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}
