use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Completer, HISTORY_WINDOW};
use crate::error::RemoteError;
use crate::message::{ChatRole, Message};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Placeholder shipped in unconfigured installs; treated as no key.
pub const API_KEY_SENTINEL: &str = "YOUR_API_KEY_HERE";

const SYSTEM_PROMPT: &str = "Você é uma assistente de IA útil, amigável e inteligente. Responda sempre em português brasileiro de forma clara e concisa.";

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct OpenAIMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

/// Connection settings for the completion endpoint.
#[derive(Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl CompletionConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_configured(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != API_KEY_SENTINEL
    }
}

impl fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    config: CompletionConfig,
}

impl OpenAIClient {
    pub fn new(config: CompletionConfig) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub(crate) fn build_request(&self, prompt: &str, history: &[Message]) -> OpenAIRequest {
        let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];

        let mut messages = Vec::with_capacity(recent.len() + 2);
        messages.push(OpenAIMessage {
            role: ChatRole::System.as_str(),
            content: SYSTEM_PROMPT.to_string(),
        });
        messages.extend(recent.iter().map(|msg| OpenAIMessage {
            role: msg.role().as_str(),
            content: msg.text.clone(),
        }));
        messages.push(OpenAIMessage {
            role: ChatRole::User.as_str(),
            content: prompt.to_string(),
        });

        OpenAIRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

#[async_trait]
impl Completer for OpenAIClient {
    async fn complete(&self, prompt: &str, history: &[Message]) -> Result<String, RemoteError> {
        if !self.config.is_configured() {
            return Err(RemoteError::MissingKey);
        }

        let request = self.build_request(prompt, history);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let response = self.client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let openai_response: OpenAIResponse =
            serde_json::from_str(&body).map_err(|e| RemoteError::Parse(e.to_string()))?;

        openai_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RemoteError::Parse("response has no choices".to_string()))
    }
}
