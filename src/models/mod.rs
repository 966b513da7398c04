//! Capability interface over the upstream AI provider.
//!
//! The story lifecycle only talks to [`StoryModel`]; the concrete provider is
//! chosen once at startup and stored in the application state.

mod openai;
pub mod prompts;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

pub use self::openai::OpenAiModel;

/// A user's provider API key. `Debug` is redacted so keys never reach logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for blank keys.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("No API key configured")]
    CredentialMissing,

    #[error("API key rejected by provider")]
    CredentialInvalid,

    #[error("Provider rate limit exceeded")]
    RateLimited,

    #[error("Provider error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Request to provider failed: {0}")]
    Transport(String),

    #[error("Unexpected provider response: {0}")]
    Parse(String),
}

impl ModelError {
    /// Classify a failed provider response by status code, then by the
    /// patterns providers put in their error bodies. A 403 only blames the
    /// key when the body says so; region and permission denials are upstream.
    pub fn classify(status: u16, body: &str) -> Self {
        match status {
            401 => return Self::CredentialInvalid,
            429 => return Self::RateLimited,
            _ => {}
        }

        let lower = body.to_ascii_lowercase();
        if lower.contains("invalid_api_key")
            || lower.contains("incorrect api key")
            || lower.contains("invalid or expired api key")
        {
            Self::CredentialInvalid
        } else if lower.contains("rate limit") || lower.contains("rate_limit") {
            Self::RateLimited
        } else {
            Self::Upstream {
                status,
                message: body.chars().take(500).collect(),
            }
        }
    }
}

/// Caption, narrative and speech capabilities of a provider.
///
/// Every call is single-shot: no retries, no backoff. Failures surface to the
/// caller of the lifecycle operation.
#[async_trait]
pub trait StoryModel: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Describe one image.
    async fn caption(&self, key: &ApiKey, image: &[u8], mime: &str) -> Result<String, ModelError>;

    /// Write a short story from the image captions.
    async fn narrate(&self, key: &ApiKey, captions: &[String]) -> Result<String, ModelError>;

    /// Rewrite `current` following `instruction`.
    async fn improve(
        &self,
        key: &ApiKey,
        current: &str,
        captions: &[String],
        instruction: &str,
    ) -> Result<String, ModelError>;

    /// Synthesize speech; returns encoded audio (mp3).
    async fn speak(&self, key: &ApiKey, text: &str) -> Result<Bytes, ModelError>;

    /// Cheap authenticated call used to check a key before saving it.
    async fn verify_key(&self, key: &ApiKey) -> Result<(), ModelError>;
}
