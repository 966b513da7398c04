// Domain types - pure, no I/O
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoryId(pub String);

impl StoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 of a narrative's text, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NarrativeHash(pub String);

impl NarrativeHash {
    pub fn of(text: &str) -> Self {
        Self(hex::encode(Sha256::digest(text.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    pub text: String,
    pub hash: NarrativeHash,
}

impl Narrative {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = NarrativeHash::of(&text);
        Self { text, hash }
    }
}

/// Synthesized speech plus the narrative it was made from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub path: String,
    pub source: NarrativeHash,
}

/// One uploaded image and the caption the vision model gave it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionedImage {
    pub path: String,
    pub caption: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStage {
    /// Images and captions only
    Draft,
    /// Narrative present, no fresh audio
    Generated,
    /// Narrative rewritten by an instruction since the last synthesis
    Improved,
    /// Audio matches the current narrative
    Narrated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DraftError {
    EmptyTitle,
    NoImages,
    TooManyImages { max: usize },
}

impl fmt::Display for DraftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTitle | Self::NoImages => {
                write!(f, "Title and at least one image are required")
            }
            Self::TooManyImages { max } => write!(f, "At most {} images are allowed", max),
        }
    }
}

impl std::error::Error for DraftError {}

/// Check a creation request before any upstream call is made.
pub fn validate_new_story(title: &str, image_count: usize, max_images: usize) -> Result<(), DraftError> {
    if title.trim().is_empty() {
        return Err(DraftError::EmptyTitle);
    }
    if image_count == 0 {
        return Err(DraftError::NoImages);
    }
    if image_count > max_images {
        return Err(DraftError::TooManyImages { max: max_images });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    pub id: StoryId,
    pub owner_id: String,
    pub title: String,
    pub pages: Vec<CaptionedImage>,
    pub narrative: Option<Narrative>,
    pub audio: Option<AudioTrack>,
    pub is_improved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A mutation of an existing story.
#[derive(Debug, Clone, PartialEq)]
pub enum StoryChange {
    /// Narrative (re)generated from the captions
    Generated(Narrative),
    /// Narrative rewritten from an instruction
    Improved(Narrative),
    /// Audio synthesized
    Narrated(AudioTrack),
}

impl Story {
    /// Build a fresh draft. Captioning has already happened, so a story can
    /// never exist without captions.
    pub fn draft(
        owner_id: impl Into<String>,
        title: &str,
        pages: Vec<CaptionedImage>,
        max_images: usize,
        now: DateTime<Utc>,
    ) -> Result<Self, DraftError> {
        validate_new_story(title, pages.len(), max_images)?;
        Ok(Self {
            id: StoryId::generate(),
            owner_id: owner_id.into(),
            title: title.trim().to_string(),
            pages,
            narrative: None,
            audio: None,
            is_improved: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn images(&self) -> Vec<String> {
        self.pages.iter().map(|p| p.path.clone()).collect()
    }

    pub fn captions(&self) -> Vec<String> {
        self.pages.iter().map(|p| p.caption.clone()).collect()
    }

    /// Audio is fresh when it was synthesized from the current narrative.
    pub fn audio_is_fresh(&self) -> bool {
        match (&self.narrative, &self.audio) {
            (Some(narrative), Some(audio)) => narrative.hash == audio.source,
            _ => false,
        }
    }

    /// Audio must be (re)synthesized before it can be served: none exists,
    /// it was made from other text, or the narrative was improved since.
    pub fn needs_narration(&self) -> bool {
        self.is_improved || !self.audio_is_fresh()
    }

    pub fn stage(&self) -> StoryStage {
        if self.narrative.is_none() {
            StoryStage::Draft
        } else if !self.needs_narration() {
            StoryStage::Narrated
        } else if self.is_improved {
            StoryStage::Improved
        } else {
            StoryStage::Generated
        }
    }

    /// Apply a change. Pure; the repository persists the result.
    pub fn apply(mut self, change: StoryChange, now: DateTime<Utc>) -> Self {
        match change {
            StoryChange::Generated(narrative) => {
                // Regenerating over existing audio leaves that audio stale
                self.is_improved = self
                    .audio
                    .as_ref()
                    .is_some_and(|audio| audio.source != narrative.hash);
                self.narrative = Some(narrative);
            }
            StoryChange::Improved(narrative) => {
                self.is_improved = true;
                self.narrative = Some(narrative);
            }
            StoryChange::Narrated(audio) => {
                // A narrative written while synthesis was in flight stays flagged
                if self.narrative.as_ref().map(|n| &n.hash) == Some(&audio.source) {
                    self.is_improved = false;
                }
                self.audio = Some(audio);
            }
        }
        self.updated_at = now;
        self
    }
}
