use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::prompts;
use super::{ApiKey, ModelError, StoryModel};
use crate::config::OpenAiConfig;

/// OpenAI REST client: chat completions for captions and stories,
/// `/audio/speech` for narration.
#[derive(Debug, Clone)]
pub struct OpenAiModel {
    client: Client,
    config: OpenAiConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
}

impl OpenAiModel {
    pub fn new(config: OpenAiConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn caption_request(&self, image: &[u8], mime: &str) -> ChatRequest<'_> {
        let data_url = format!("data:{};base64,{}", mime, BASE64.encode(image));
        ChatRequest {
            model: &self.config.caption_model,
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: prompts::CAPTION_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ]),
            }],
            max_tokens: None,
            temperature: None,
        }
    }

    fn story_request(&self, prompt: String, max_tokens: u32) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.config.story_model,
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Text(prompt),
            }],
            max_tokens: Some(max_tokens),
            temperature: Some(self.config.temperature),
        }
    }

    async fn send_chat(&self, key: &ApiKey, request: &ChatRequest<'_>) -> Result<String, ModelError> {
        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(key.expose())
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        first_choice_text(body)
    }
}

fn transport_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        error!("Provider request timed out");
        ModelError::Transport("request timed out".to_string())
    } else {
        error!(error = %e, "Failed to send request to provider");
        ModelError::Transport(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(status = status.as_u16(), "Provider returned error");
    Err(ModelError::classify(status.as_u16(), &body))
}

fn first_choice_text(response: ChatResponse) -> Result<String, ModelError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ModelError::Parse("response contained no text".to_string()))
}

#[async_trait]
impl StoryModel for OpenAiModel {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    #[instrument(skip(self, key, image), fields(model = %self.config.caption_model, bytes = image.len()))]
    async fn caption(&self, key: &ApiKey, image: &[u8], mime: &str) -> Result<String, ModelError> {
        debug!("Requesting image caption");
        let request = self.caption_request(image, mime);
        self.send_chat(key, &request).await
    }

    #[instrument(skip(self, key, captions), fields(model = %self.config.story_model, captions = captions.len()))]
    async fn narrate(&self, key: &ApiKey, captions: &[String]) -> Result<String, ModelError> {
        debug!("Requesting story");
        let request = self.story_request(
            prompts::story_prompt(captions),
            self.config.story_max_tokens,
        );
        self.send_chat(key, &request).await
    }

    #[instrument(skip_all, fields(model = %self.config.story_model))]
    async fn improve(
        &self,
        key: &ApiKey,
        current: &str,
        captions: &[String],
        instruction: &str,
    ) -> Result<String, ModelError> {
        debug!("Requesting story revision");
        let request = self.story_request(
            prompts::improve_prompt(current, captions, instruction),
            self.config.improve_max_tokens,
        );
        self.send_chat(key, &request).await
    }

    #[instrument(skip(self, key, text), fields(model = %self.config.speech_model, chars = text.len()))]
    async fn speak(&self, key: &ApiKey, text: &str) -> Result<Bytes, ModelError> {
        debug!("Requesting speech synthesis");
        let request = SpeechRequest {
            model: &self.config.speech_model,
            voice: &self.config.voice,
            input: text,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(self.url("audio/speech"))
            .bearer_auth(key.expose())
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let audio = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        if audio.is_empty() {
            return Err(ModelError::Parse("empty audio response".to_string()));
        }
        Ok(audio)
    }

    #[instrument(skip_all)]
    async fn verify_key(&self, key: &ApiKey) -> Result<(), ModelError> {
        let response = self
            .client
            .get(self.url("models"))
            .bearer_auth(key.expose())
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await.map(|_| ())
    }
}
