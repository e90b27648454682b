use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiSettings;

const PROMPT_SYSTEM: &str =
    "You are a helpful assistant that generates a daily text prompt for a game.";

/// Chat + embedding provider client (OpenAI-compatible API).
///
/// Both operations are single blocking round-trips: an empty payload from
/// the provider is a hard error and nothing is retried.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    settings: OpenAiSettings,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
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
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiClient {
    pub fn new(http: Client, settings: OpenAiSettings) -> Self {
        Self { http, settings }
    }

    /// Ask the chat model for an image-generation prompt seeded with the
    /// day's theme: descriptive enough to render, plain enough to guess.
    pub async fn generate_image_prompt(&self, theme: &str) -> Result<String> {
        let instruction = format!(
            "Generate a prompt for the game. Use the theme \"{}\" as inspiration. \
             The prompt should be a phrase, and its usage will be to be passed to an AI \
             to generate an image. So it needs to be descriptive, but not so cryptic \
             that a user can't guess what it is by looking at the image. And don't use \
             sophisticated words, use words that normal people use.",
            theme
        );

        let payload = ChatCompletionRequest {
            model: &self.settings.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: PROMPT_SYSTEM,
                },
                ChatMessage {
                    role: "user",
                    content: &instruction,
                },
            ],
        };

        let url = format!("{}/chat/completions", self.settings.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to call chat completions API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Chat completions API returned error {}: {}",
                status,
                error_text
            ));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse chat completions response")?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| anyhow!("Failed to generate a prompt: no content in the response"))
    }

    /// Embed a text into a fixed-length float vector.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>> {
        let payload = EmbeddingRequest {
            model: &self.settings.embedding_model,
            input,
            encoding_format: "float",
        };

        let url = format!("{}/embeddings", self.settings.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to call embeddings API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Embeddings API returned error {}: {}",
                status,
                error_text
            ));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embeddings response")?;

        body.data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or_else(|| anyhow!("Failed to generate embeddings: no data in the response"))
    }
}
