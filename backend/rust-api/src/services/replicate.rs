use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ReplicateSettings;

/// Image generation provider client (Replicate-compatible API).
///
/// Predictions are requested with `Prefer: wait`, so the render is one
/// blocking round-trip with no client-side polling and no retries.
#[derive(Clone)]
pub struct ReplicateClient {
    http: Client,
    settings: ReplicateSettings,
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    input: GenerationInput<'a>,
}

/// Fixed generation parameters: single square webp output.
#[derive(Debug, Serialize)]
struct GenerationInput<'a> {
    prompt: &'a str,
    guidance: f32,
    num_outputs: u32,
    aspect_ratio: &'a str,
    output_format: &'a str,
    output_quality: u32,
    prompt_strength: f32,
    num_inference_steps: u32,
}

impl<'a> GenerationInput<'a> {
    fn for_prompt(prompt: &'a str) -> Self {
        Self {
            prompt,
            guidance: 3.5,
            num_outputs: 1,
            aspect_ratio: "1:1",
            output_format: "webp",
            output_quality: 80,
            prompt_strength: 0.9,
            num_inference_steps: 28,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    status: String,
    #[serde(default)]
    output: Option<Vec<String>>,
    #[serde(default)]
    error: Option<String>,
}

impl ReplicateClient {
    pub fn new(http: Client, settings: ReplicateSettings) -> Self {
        Self { http, settings }
    }

    /// Render an image for the prompt and return the URL of the first
    /// output. The model may produce several; only the first is used.
    pub async fn render(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}/predictions",
            self.settings.base_url, self.settings.model
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.api_token)
            .header("Prefer", "wait")
            .json(&PredictionRequest {
                input: GenerationInput::for_prompt(prompt),
            })
            .send()
            .await
            .context("Failed to call image generation API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Image generation API returned error {}: {}",
                status,
                error_text
            ));
        }

        let prediction: PredictionResponse = response
            .json()
            .await
            .context("Failed to parse image generation response")?;

        if let Some(error) = prediction.error {
            return Err(anyhow!("Image generation failed: {}", error));
        }

        prediction
            .output
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| {
                anyhow!(
                    "Image generation returned no output (status: {})",
                    prediction.status
                )
            })
    }

    /// Fetch the rendered image bytes from the provider's output URL.
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("Failed to fetch rendered image")?
            .error_for_status()
            .context("Image download returned error status")?;

        let bytes = response
            .bytes()
            .await
            .context("Failed to read image bytes")?;

        Ok(bytes.to_vec())
    }
}
