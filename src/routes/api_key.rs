use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody};
use crate::models::ApiKey;
use crate::state::AppState;

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyBody {
    #[serde(default)]
    pub dalle_api_key: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dalle-api-key", get(retrieve).post(store))
        .route("/verify-dalle-api-key", post(verify))
}

async fn retrieve(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<ApiKeyBody>> {
    let record = state
        .users
        .get_by_id(&user.id)?
        .ok_or(AppError::NotFound("User not found"))?;

    Ok(Json(ApiKeyBody {
        dalle_api_key: record.api_key,
    }))
}

async fn store(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(body): JsonBody<ApiKeyBody>,
) -> AppResult<Json<serde_json::Value>> {
    if body.dalle_api_key.trim().is_empty() {
        return Err(AppError::BadRequest("API key is required".to_string()));
    }

    let updated = state.users.update_api_key(&user.id, &body.dalle_api_key)?;
    tracing::info!(user_id = %user.id, "Stored provider API key");

    Ok(Json(json!({
        "message": "API key stored successfully",
        "dalleApiKey": updated.api_key,
    })))
}

/// Check a key against the provider without storing it.
async fn verify(
    State(state): State<AppState>,
    _user: CurrentUser,
    JsonBody(body): JsonBody<ApiKeyBody>,
) -> AppResult<Response> {
    let Some(key) = ApiKey::new(body.dalle_api_key) else {
        return Err(AppError::BadRequest("API key is required".to_string()));
    };

    match state.model.verify_key(&key).await {
        Ok(()) => Ok(Json(json!({ "valid": true, "message": "API key is valid" })).into_response()),
        Err(e) => {
            tracing::info!(provider = state.model.provider_name(), error = %e, "API key verification failed");
            Ok((
                StatusCode::BAD_REQUEST,
                Json(json!({ "valid": false, "error": "Invalid API key" })),
            )
                .into_response())
        }
    }
}
