// model completion client - openrouter api communication behind a mockable
// trait so the orchestrator can be tested without network

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const MAX_HTTP_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// one completion request; the orchestrator owns model/temperature choices
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

/// whether the model stopped on its own or ran out of budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Truncated,
    Other,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub finish_reason: FinishReason,
}

impl Completion {
    pub fn finished_cleanly(&self) -> bool {
        self.finish_reason == FinishReason::Stop
    }
}

/// the single suspension point of a generation attempt
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: String,
}

/// reqwest-backed openrouter client
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build http client")?;
        Ok(OpenRouterClient { http, api_key })
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY environment variable is not set")?;
        OpenRouterClient::new(api_key)
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let body = ApiRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
        };

        let mut retry_delay = Duration::from_secs(1);
        for attempt in 0..MAX_HTTP_RETRIES {
            let response = self
                .http
                .post(OPENROUTER_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let parsed = resp
                        .json::<ApiResponse>()
                        .await
                        .context("failed to parse openrouter response")?;
                    let choice = parsed
                        .choices
                        .into_iter()
                        .next()
                        .context("openrouter response carried no choices")?;
                    let finish_reason = match choice.finish_reason.as_deref() {
                        Some("stop") => FinishReason::Stop,
                        Some("length") => FinishReason::Truncated,
                        _ => FinishReason::Other,
                    };
                    return Ok(Completion {
                        content: choice.message.content,
                        finish_reason,
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "unknown error".to_string());
                    let retryable = status.is_server_error() || status.as_u16() == 429;
                    if retryable && attempt < MAX_HTTP_RETRIES - 1 {
                        sleep(retry_delay).await;
                        retry_delay *= 2;
                        continue;
                    }
                    // surface the api's own message when the body is json
                    let detail = serde_json::from_str::<serde_json::Value>(&text)
                        .ok()
                        .and_then(|v| v["error"]["message"].as_str().map(String::from))
                        .unwrap_or(text);
                    anyhow::bail!("openrouter api error ({status}): {detail}");
                }
                Err(e) => {
                    if attempt < MAX_HTTP_RETRIES - 1 {
                        sleep(retry_delay).await;
                        retry_delay *= 2;
                        continue;
                    }
                    return Err(e).context(format!(
                        "failed to reach openrouter after {MAX_HTTP_RETRIES} attempts"
                    ));
                }
            }
        }
        anyhow::bail!("failed to complete api request after {MAX_HTTP_RETRIES} attempts")
    }
}
