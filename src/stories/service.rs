//! Story lifecycle: upload and caption, generate, improve, narrate.
//!
//! Every operation is scoped to the authenticated owner. Changes to an
//! existing story go through [`StoryRepository::apply`], which runs the pure
//! transition from [`Story::apply`] inside a single write transaction.

use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use tracing::{info, warn};

use crate::auth::users::{UserDirectory, UserError};
use crate::models::{ApiKey, ModelError, StoryModel};
use crate::storage::{ImageUpload, MediaStore};
use crate::stories::domain::{
    validate_new_story, AudioTrack, CaptionedImage, Narrative, Story, StoryChange, StoryId,
};
use crate::stories::repository::{DynStoryRepository, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    #[error("{0}")]
    Validation(String),

    #[error("Story not found")]
    NotFound,

    #[error("Generate a story before improving or narrating it")]
    NarrativeMissing,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Users(#[from] UserError),

    #[error(transparent)]
    Repository(RepositoryError),

    #[error("Media storage failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RepositoryError> for StoryError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(_) => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}

/// Result of a narrate call.
#[derive(Debug, Clone)]
pub struct Narration {
    pub audio_path: String,
    /// False when the cached audio already matched the narrative
    pub regenerated: bool,
    pub story: Story,
}

pub struct StoryLifecycle {
    repo: DynStoryRepository,
    users: Arc<dyn UserDirectory>,
    model: Arc<dyn StoryModel>,
    media: MediaStore,
    max_images: usize,
}

impl StoryLifecycle {
    pub fn new(
        repo: DynStoryRepository,
        users: Arc<dyn UserDirectory>,
        model: Arc<dyn StoryModel>,
        media: MediaStore,
        max_images: usize,
    ) -> Self {
        Self {
            repo,
            users,
            model,
            media,
            max_images,
        }
    }

    fn api_key(&self, owner_id: &str) -> Result<ApiKey, StoryError> {
        let user = self.users.get_by_id(owner_id)?.ok_or(UserError::NotFound)?;
        user.provider_key()
            .and_then(ApiKey::new)
            .ok_or(StoryError::Model(ModelError::CredentialMissing))
    }

    /// Caption every image, then write the files and persist the story.
    /// Nothing is stored if any step fails.
    pub async fn create(
        &self,
        owner_id: &str,
        title: &str,
        images: Vec<ImageUpload>,
    ) -> Result<Story, StoryError> {
        validate_new_story(title, images.len(), self.max_images)
            .map_err(|e| StoryError::Validation(e.to_string()))?;
        let key = self.api_key(owner_id)?;

        let captions = try_join_all(images.iter().map(|image| {
            let key = &key;
            let model = &self.model;
            async move { model.caption(key, &image.bytes, &image.mime()).await }
        }))
        .await?;

        let mut saved = Vec::with_capacity(images.len());
        for image in &images {
            match self.media.save_image(image).await {
                Ok(path) => saved.push(path),
                Err(e) => {
                    self.discard(&saved).await;
                    return Err(e.into());
                }
            }
        }

        let pages = saved
            .iter()
            .cloned()
            .zip(captions)
            .map(|(path, caption)| CaptionedImage { path, caption })
            .collect();

        let persisted = match Story::draft(owner_id, title, pages, self.max_images, Utc::now()) {
            Ok(story) => self.repo.insert(&story).await.map(|()| story).map_err(StoryError::from),
            Err(e) => Err(StoryError::Validation(e.to_string())),
        };

        match persisted {
            Ok(story) => {
                info!(story_id = %story.id, owner_id, images = saved.len(), "Created story");
                Ok(story)
            }
            Err(e) => {
                self.discard(&saved).await;
                Err(e)
            }
        }
    }

    async fn discard(&self, paths: &[String]) {
        for path in paths {
            self.media.remove(path).await;
        }
    }

    pub async fn list(&self, owner_id: &str) -> Result<Vec<Story>, StoryError> {
        Ok(self.repo.list(owner_id).await?)
    }

    pub async fn get(&self, owner_id: &str, id: &StoryId) -> Result<Story, StoryError> {
        self.repo
            .find(owner_id, id)
            .await?
            .ok_or(StoryError::NotFound)
    }

    /// (Re)write the narrative from the captions. Last write wins.
    pub async fn generate(&self, owner_id: &str, id: &StoryId) -> Result<Story, StoryError> {
        let story = self.get(owner_id, id).await?;
        let key = self.api_key(owner_id)?;

        let text = self.model.narrate(&key, &story.captions()).await?;
        let story = self
            .repo
            .apply(owner_id, id, StoryChange::Generated(Narrative::new(text)), Utc::now())
            .await?;

        info!(story_id = %id, stale_audio = story.is_improved, "Generated narrative");
        Ok(story)
    }

    /// Rewrite the narrative following a user instruction. Audio is left as is.
    pub async fn improve(
        &self,
        owner_id: &str,
        id: &StoryId,
        instruction: &str,
    ) -> Result<Story, StoryError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(StoryError::Validation("Instruction is required".to_string()));
        }

        let story = self.get(owner_id, id).await?;
        let current = story.narrative.as_ref().ok_or(StoryError::NarrativeMissing)?;
        let key = self.api_key(owner_id)?;

        let text = self
            .model
            .improve(&key, &current.text, &story.captions(), instruction)
            .await?;
        let story = self
            .repo
            .apply(owner_id, id, StoryChange::Improved(Narrative::new(text)), Utc::now())
            .await?;

        info!(story_id = %id, "Improved narrative");
        Ok(story)
    }

    /// Return audio for the current narrative, synthesizing it when none
    /// exists, it was made from different text, or the story was improved.
    pub async fn narrate(&self, owner_id: &str, id: &StoryId) -> Result<Narration, StoryError> {
        let story = self.get(owner_id, id).await?;
        let narrative = story.narrative.clone().ok_or(StoryError::NarrativeMissing)?;

        if !story.needs_narration() {
            if let Some(audio) = &story.audio {
                return Ok(Narration {
                    audio_path: audio.path.clone(),
                    regenerated: false,
                    story,
                });
            }
        }

        let key = self.api_key(owner_id)?;
        let audio = self.model.speak(&key, &narrative.text).await?;
        let path = self.media.save_audio(id.as_str(), &audio).await?;

        let track = AudioTrack {
            path: path.clone(),
            source: narrative.hash,
        };
        let story = match self
            .repo
            .apply(owner_id, id, StoryChange::Narrated(track), Utc::now())
            .await
        {
            Ok(story) => story,
            Err(e) => {
                self.media.remove(&path).await;
                return Err(e.into());
            }
        };

        if story.is_improved {
            warn!(story_id = %id, "Narrative changed during synthesis; audio is already stale");
        }
        info!(story_id = %id, audio_path = %path, "Synthesized narration");

        Ok(Narration {
            audio_path: path,
            regenerated: true,
            story,
        })
    }

    /// Remove the record. Media files stay on disk.
    pub async fn delete(&self, owner_id: &str, id: &StoryId) -> Result<(), StoryError> {
        if !self.repo.delete(owner_id, id).await? {
            return Err(StoryError::NotFound);
        }
        info!(story_id = %id, owner_id, "Deleted story");
        Ok(())
    }
}
