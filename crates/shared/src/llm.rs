use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::LlmSettings;
use crate::error::{retry_delay, Error, LlmError, Result};

const SYSTEM_PROMPT: &str =
    "You are a news analyst expert at structured summarization. Be concise and focus on key points.";

#[derive(Debug, Serialize)]
pub struct ClaudeRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Client for the Anthropic Messages API.
pub struct ClaudeClient {
    client: Client,
    settings: LlmSettings,
}

impl ClaudeClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(Error::HttpClient)?;

        Ok(Self { client, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// The request body that [`ClaudeClient::complete`] sends for `prompt`.
    pub fn request_for(&self, prompt: &str) -> ClaudeRequest {
        ClaudeRequest {
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        }
    }

    /// Sends one prompt and returns the model's text.
    ///
    /// Network errors, 429 and 5xx are retried up to `max_retries` times with
    /// exponential backoff; everything else fails straight away.
    pub async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = self.request_for(prompt);
        let mut attempt = 0;

        loop {
            match self.try_complete(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    let backoff = retry_delay(self.settings.retry_backoff, attempt);
                    warn!(error = %e, ?backoff, "language model call failed, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_complete(&self, request: &ClaudeRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.settings.base_url))
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let claude_response: ClaudeResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::InvalidResponse(format!("undecodable body: {e}")))?;

        let text = claude_response
            .content
            .iter()
            .filter(|c| c.kind == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse("response contained no text".to_string()));
        }

        Ok(text.to_string())
    }
}
