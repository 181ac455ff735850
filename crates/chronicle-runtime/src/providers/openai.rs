//! OpenAI API Provider
//!
//! Implements the AIProvider trait for OpenAI's Chat Completions API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::debug;

use crate::{AIProvider, GenerateRequest, GenerateResponse, ProviderError};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    pub default_model: String,
}

impl OpenAIProvider {
    /// Build a provider from `OPENAI_API_KEY`, `OPENAI_API_BASE` and
    /// `OPENAI_CHEAP_CHAT_MODEL`, loading a `.env` file first when present.
    pub fn from_env() -> Result<Self, ProviderError> {
        dotenvy::dotenv().ok();

        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::Config("OPENAI_API_KEY is not set".to_string()))?;

        let base_url = env::var("OPENAI_API_BASE").unwrap_or_else(|_| OPENAI_API_BASE.to_string());

        let default_model =
            env::var("OPENAI_CHEAP_CHAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self::new(api_key, base_url, default_model)
    }

    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Self::with_timeout(api_key, base_url, default_model, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            default_model: default_model.into(),
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn get_model(&self, req: &GenerateRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn build_body(&self, req: &GenerateRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = req.system.as_ref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: req.prompt.clone(),
        });

        ChatCompletionRequest {
            model: self.get_model(req),
            messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl AIProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let body = self.build_body(&req);
        debug!(model = %body.model, messages = body.messages.len(), "sending chat completion");

        let response = self
            .client
            .post(self.endpoint("/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;

        let content = choice
            .message
            .content
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(ProviderError::EmptyResponse)?;

        Ok(GenerateResponse {
            content,
            model: Some(completion.model),
            finish_reason: choice.finish_reason,
        })
    }
}
