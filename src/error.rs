use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::users::UserError;
use crate::models::ModelError;
use crate::stories::repository::RepositoryError;
use crate::stories::StoryError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(&'static str),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(&'static str),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("No provider API key configured")]
    CredentialMissing,

    #[error("Provider rejected the API key")]
    CredentialInvalid,

    #[error("Provider rate limit exceeded")]
    RateLimited,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<UserError> for AppError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::Validation(msg) => AppError::BadRequest(msg.to_string()),
            UserError::DuplicateEmail => AppError::BadRequest(e.to_string()),
            UserError::NotFound => AppError::NotFound("User not found"),
            UserError::Hash(e) => AppError::Internal(e.to_string()),
            UserError::Database(e) => AppError::Database(e),
            UserError::Pool(e) => AppError::Pool(e),
        }
    }
}

impl From<ModelError> for AppError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::CredentialMissing => AppError::CredentialMissing,
            ModelError::CredentialInvalid => AppError::CredentialInvalid,
            ModelError::RateLimited => AppError::RateLimited,
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::BadRequest(format!("Invalid request body: {}", e.body_text()))
    }
}

impl From<MultipartRejection> for AppError {
    fn from(e: MultipartRejection) -> Self {
        AppError::BadRequest(format!("Invalid upload: {}", e.body_text()))
    }
}

impl From<StoryError> for AppError {
    fn from(e: StoryError) -> Self {
        match e {
            StoryError::Validation(msg) => AppError::BadRequest(msg),
            StoryError::NotFound => AppError::NotFound("Story not found"),
            StoryError::NarrativeMissing => AppError::Conflict(e.to_string()),
            StoryError::Model(e) => e.into(),
            StoryError::Users(e) => e.into(),
            StoryError::Repository(RepositoryError::Database(e)) => AppError::Pool(e),
            StoryError::Repository(RepositoryError::Sql(e)) => AppError::Database(e),
            StoryError::Repository(RepositoryError::Serialization(e)) => AppError::Json(e),
            StoryError::Repository(RepositoryError::NotFound(_)) => {
                AppError::NotFound("Story not found")
            }
            StoryError::Repository(e) => AppError::Internal(e.to_string()),
            StoryError::Io(e) => AppError::Io(e),
        }
    }
}

fn internal() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::MethodNotAllowed(msg) => (StatusCode::METHOD_NOT_ALLOWED, msg.to_string()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::CredentialMissing => (
                StatusCode::BAD_REQUEST,
                "Please add your OpenAI API key in settings first".to_string(),
            ),
            AppError::CredentialInvalid => (
                StatusCode::FORBIDDEN,
                "Your OpenAI API key was rejected. Please check it in settings".to_string(),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "OpenAI rate limit reached. Please try again shortly".to_string(),
            ),
            AppError::Upstream(msg) => {
                tracing::warn!("Upstream error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "The AI service failed to respond. Please try again".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                internal()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                internal()
            }
            AppError::Io(e) => {
                tracing::error!("I/O error: {}", e);
                internal()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                internal()
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                internal()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
