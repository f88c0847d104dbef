//! Generation collaborator: the chat-completion capability the pipeline
//! drives for expansion and synthesis calls.
//!
//! The core consumes generation through the [`Generator`] trait only.
//! [`OpenAiCompatibleGenerator`] talks to OpenAI, Azure, Ollama, vLLM,
//! LM Studio, or any endpoint that follows the OpenAI chat completions
//! API format.

use crate::config::GenerationConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message in a generation conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A declared JSON shape the response content must match, enforced
/// server-side where the endpoint supports structured output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

/// One generation request: fixed system instructions, a conversation, and
/// optionally a declared response shape.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    /// Per-request sampling override. `None` defers to the provider's
    /// configured temperature.
    pub temperature: Option<f32>,
    pub response_schema: Option<ResponseSchema>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: Vec::new(),
            temperature: None,
            response_schema: None,
        }
    }

    pub fn with_user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// Trait for generation providers.
///
/// Transport failures surface as [`PipelineError::Generation`] or
/// [`PipelineError::Http`]; a response that arrives but does not match its
/// declared shape is the caller's structural-parse concern, not the
/// provider's.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Perform one generation call and return the raw response text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible generation provider.
pub struct OpenAiCompatibleGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompatibleGenerator {
    /// Create a new provider from configuration.
    ///
    /// Reads the API key from `config.api_key` or the environment variable
    /// named in `config.api_key_env`. Local endpoints (Ollama, vLLM,
    /// LM Studio) do not require a real key and fall back to a dummy bearer
    /// token.
    pub fn new(config: &GenerationConfig) -> Result<Self, PipelineError> {
        let is_local = config
            .base_url
            .as_ref()
            .map(|u| u.contains("localhost") || u.contains("127.0.0.1"))
            .unwrap_or(false);

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .or_else(|| {
                if is_local {
                    debug!("No API key set for local provider; using dummy bearer token");
                    Some("local".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| {
                PipelineError::AuthFailed(format!("env var '{}' not set", config.api_key_env))
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            base_url,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Build the chat completions request body.
    fn build_body(&self, request: &GenerationRequest) -> Value {
        let mut messages = vec![json!({"role": "system", "content": request.system})];
        for msg in &request.messages {
            let role = match msg.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": msg.content}));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
        });

        if let Some(ref schema) = request.response_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                    "strict": true,
                },
            });
        }

        body
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(request);

        debug!(model = %self.model, url = %url, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::generation(format!(
                "endpoint returned {status}: {text}"
            )));
        }

        let parsed: Value = response.json().await?;
        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                PipelineError::generation("response missing choices[0].message.content")
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
