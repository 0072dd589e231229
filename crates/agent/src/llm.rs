use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use mailsmith_core::compiler::{CompiledInstruction, UserContent};
use mailsmith_core::config::{LlmConfig, LlmProvider};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm provider is not configured")]
    Disabled,
    #[error("llm call timed out after {0}s")]
    Timeout(u64),
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm provider returned status {status} for model `{model}`")]
    Status { status: u16, model: String },
    #[error("llm returned an empty completion")]
    EmptyCompletion,
    #[error("could not decode llm response: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_content: UserContent,
    pub temperature: f32,
}

impl From<&CompiledInstruction> for CompletionRequest {
    fn from(compiled: &CompiledInstruction) -> Self {
        Self {
            system_prompt: compiled.system_prompt.clone(),
            user_content: compiled.user_content.clone(),
            temperature: compiled.temperature,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Injected when no provider credentials are configured. Every call fails,
/// which sends create requests to the deterministic fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledLlmClient;

#[async_trait]
impl LlmClient for DisabledLlmClient {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a UserContent,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

/// Chat-completions client for OpenRouter, OpenAI and Ollama. Models in the
/// chain are tried in order until one returns a non-empty completion.
pub struct OpenAiCompatibleClient {
    http: Client,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<SecretString>,
    models: Vec<String>,
    max_tokens: u32,
    timeout_secs: u64,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            provider: config.provider,
            endpoint: format!("{}/chat/completions", config.effective_base_url()),
            api_key: config.api_key.clone(),
            models: config.model_chain(),
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn complete_with_model(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<String, LlmError> {
        let system = UserContent::Text(request.system_prompt.clone());
        let body = chat_request(model, &system, request, self.max_tokens);

        let mut builder = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }
        if self.provider == LlmProvider::OpenRouter {
            builder = builder.header("X-Title", "mailsmith");
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout(self.timeout_secs)
            } else {
                LlmError::Transport(error.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(LlmError::Status {
                status: response.status().as_u16(),
                model: model.to_string(),
            });
        }

        let payload: Value =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        extract_completion(&payload)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let mut last_error = LlmError::EmptyCompletion;
        for model in &self.models {
            match self.complete_with_model(model, request).await {
                Ok(content) => {
                    debug!(event_name = "llm.complete.ok", model = %model, chars = content.len());
                    return Ok(content);
                }
                Err(error @ LlmError::Timeout(_)) => return Err(error),
                Err(error) => {
                    warn!(
                        event_name = "llm.complete.model_failed",
                        model = %model,
                        error = %error,
                        "trying next model in chain"
                    );
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }
}

fn chat_request<'a>(
    model: &'a str,
    system: &'a UserContent,
    request: &'a CompletionRequest,
    max_tokens: u32,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![
            ChatMessage { role: "system", content: system },
            ChatMessage { role: "user", content: &request.user_content },
        ],
        temperature: request.temperature,
        max_tokens,
    }
}

/// `choices[0].message.content`, rejecting missing or blank content.
pub fn extract_completion(payload: &Value) -> Result<String, LlmError> {
    let content = payload
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .ok_or_else(|| LlmError::Decode("missing choices[0].message.content".to_string()))?;

    match content {
        Value::String(text) if !text.trim().is_empty() => Ok(text.clone()),
        Value::String(_) | Value::Null => Err(LlmError::EmptyCompletion),
        _ => Err(LlmError::Decode("completion content is not a string".to_string())),
    }
}
