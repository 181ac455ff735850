//! Runtime abstractions for language-model providers.
//!
//! Providers expose a single non-streaming completion call through the
//! [`AIProvider`] trait. [`MockProvider`] answers from a queue for tests;
//! [`OpenAIProvider`] talks to the Chat Completions API.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod providers;

pub use providers::OpenAIProvider;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Optional system instruction sent ahead of the prompt.
    pub system: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub metadata: Option<serde_json::Value>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            model: None,
            max_tokens: None,
            temperature: None,
            metadata: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: String,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
}

impl GenerateResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: None,
            finish_reason: Some("stop".to_string()),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider configuration error: {0}")]
    Config(String),
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("response decode error: {0}")]
    Decode(String),
    #[error("provider returned no content")]
    EmptyResponse,
    #[error("mock provider has no queued response")]
    MockQueueEmpty,
    #[error("provider error: {0}")]
    Message(String),
}

#[async_trait]
pub trait AIProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError>;
}

#[derive(Debug, Default)]
pub struct MockProvider {
    generate_queue: Mutex<VecDeque<Result<GenerateResponse, ProviderError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    latency: Option<Duration>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `generate` call, useful for exercising caller timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn enqueue_generate(&self, result: Result<GenerateResponse, ProviderError>) {
        self.generate_queue
            .lock()
            .expect("mock generate queue poisoned")
            .push_back(result);
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .clone()
    }
}

#[async_trait]
impl AIProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .push(req);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.generate_queue
            .lock()
            .expect("mock generate queue poisoned")
            .pop_front()
            .unwrap_or(Err(ProviderError::MockQueueEmpty))
    }
}
