use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::UploadConfig;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody};
use crate::state::AppState;
use crate::storage::ImageUpload;
use crate::stories::{Narration, Story, StoryId, StoryStage};

/// Story as the front-end sees it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryResponse {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub images: Vec<String>,
    pub image_summaries: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_story: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    pub is_improved: bool,
    pub stage: StoryStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Story> for StoryResponse {
    fn from(story: Story) -> Self {
        Self {
            images: story.images(),
            image_summaries: story.captions(),
            stage: story.stage(),
            id: story.id.0,
            user_id: story.owner_id,
            title: story.title,
            generated_story: story.narrative.map(|n| n.text),
            audio_path: story.audio.map(|a| a.path),
            is_improved: story.is_improved,
            created_at: story.created_at,
            updated_at: story.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrateResponse {
    pub audio_path: String,
    pub regenerated: bool,
    pub story: StoryResponse,
}

impl From<Narration> for NarrateResponse {
    fn from(narration: Narration) -> Self {
        Self {
            audio_path: narration.audio_path,
            regenerated: narration.regenerated,
            story: narration.story.into(),
        }
    }
}

#[derive(Deserialize)]
pub struct ImproveRequest {
    #[serde(default)]
    pub instruction: String,
}

pub fn router(uploads: &UploadConfig) -> Router<AppState> {
    Router::new()
        .route(
            "/stories",
            post(create_story)
                .layer(DefaultBodyLimit::max(uploads.body_limit_bytes()))
                .get(list_stories),
        )
        .route("/stories/{id}", get(get_story).delete(delete_story))
        .route("/stories/{id}/generate", post(generate_story))
        .route("/stories/{id}/improve", post(improve_story))
        .route("/stories/{id}/narrate", post(narrate_story))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid upload: {}", e.body_text()))
}

/// Multipart form: one `title` text field and any number of `images` files.
async fn create_story(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<(StatusCode, Json<StoryResponse>)> {
    let mut multipart = multipart?;
    let mut title = String::new();
    let mut images = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => {
                title = field.text().await.map_err(multipart_error)?;
            }
            "images" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                images.push(ImageUpload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let story = state.stories.create(&user.id, &title, images).await?;
    Ok((StatusCode::CREATED, Json(story.into())))
}

async fn list_stories(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<StoryResponse>>> {
    let stories = state.stories.list(&user.id).await?;
    Ok(Json(stories.into_iter().map(StoryResponse::from).collect()))
}

async fn get_story(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<StoryResponse>> {
    let story = state.stories.get(&user.id, &StoryId::new(id)).await?;
    Ok(Json(story.into()))
}

async fn delete_story(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.stories.delete(&user.id, &StoryId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn generate_story(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<StoryResponse>> {
    let story = state.stories.generate(&user.id, &StoryId::new(id)).await?;
    Ok(Json(story.into()))
}

async fn improve_story(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ImproveRequest>,
) -> AppResult<Json<StoryResponse>> {
    let story = state
        .stories
        .improve(&user.id, &StoryId::new(id), &req.instruction)
        .await?;
    Ok(Json(story.into()))
}

async fn narrate_story(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<NarrateResponse>> {
    let narration = state.stories.narrate(&user.id, &StoryId::new(id)).await?;
    Ok(Json(narration.into()))
}
