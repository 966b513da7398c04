use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::session;
use crate::auth::users::{NewUser, UserError};
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody, MaybeUser};
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct PasswordRequest {
    #[serde(default)]
    pub password: String,
}

// -- Response types --

/// Public view of a user. Secrets never leave the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub has_api_key: bool,
    pub last_login_at: Option<String>,
    pub created_at: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            has_api_key: user.provider_key().is_some(),
            id: user.id,
            email: user.email,
            name: user.name,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

fn load_profile(state: &AppState, user: &CurrentUser) -> AppResult<UserProfile> {
    state
        .users
        .get_by_id(&user.id)?
        .map(UserProfile::from)
        .ok_or(AppError::NotFound("User not found"))
}

/// Run a password-hashing store call on the blocking pool; bcrypt at the
/// configured cost takes long enough to stall a worker thread.
async fn hashing<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> Result<T, UserError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Password task failed: {}", e)))?
        .map_err(AppError::from)
}

// -- Handlers --

pub async fn register(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> AppResult<Response> {
    if let MaybeUser(Some(current)) = maybe_user {
        let profile = load_profile(&state, &current)?;
        return Ok(Json(json!({ "user": profile })).into_response());
    }

    let users = state.users.clone();
    let new_user = NewUser {
        email: req.email,
        password: req.password,
        name: req.name,
    };
    let user = hashing(move || users.create_user(new_user)).await?;

    Ok((StatusCode::CREATED, Json(UserProfile::from(user))).into_response())
}

pub async fn register_get() -> AppError {
    AppError::MethodNotAllowed("Register with POST instead")
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<Response> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let users = state.users.clone();
    let (email, password) = (req.email.clone(), req.password);
    let Some(user) = hashing(move || users.authenticate(&email, &password)).await? else {
        tracing::info!(email = %req.email.trim(), "Authentication failed");
        return Err(AppError::BadRequest(
            "Email or password is incorrect".to_string(),
        ));
    };

    let token = session::create_session(&state.db, &user.id, state.config.auth.session_hours)?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            session::session_cookie(&state.config.auth, &token),
        )],
        Json(json!({
            "message": "Login successful",
            "user": { "id": user.id, "email": user.email },
        })),
    )
        .into_response())
}

pub async fn login_get() -> AppError {
    AppError::MethodNotAllowed("Login with POST instead")
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = session::cookie_value(&headers, &state.config.auth.cookie_name) {
        session::delete_session(&state.db, token)?;
    }

    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            session::clear_session_cookie(&state.config.auth),
        )],
        Json(json!({ "message": "Logged out successfully" })),
    )
        .into_response())
}

pub async fn set_password(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(req): JsonBody<PasswordRequest>,
) -> AppResult<StatusCode> {
    if req.password.is_empty() {
        return Err(AppError::BadRequest("Password is required".to_string()));
    }
    let users = state.users.clone();
    let user_id = user.id.clone();
    hashing(move || users.set_password(&user_id, &req.password)).await?;
    tracing::info!(user_id = %user.id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<UserProfile>> {
    Ok(Json(load_profile(&state, &user)?))
}

/// Issue a fresh API token; the previous one stops working immediately.
pub async fn regenerate_token(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    let token = state.users.regenerate_token(&user.id)?;
    tracing::info!(user_id = %user.id, "API token regenerated");
    Ok(Json(json!({ "token": token })))
}
