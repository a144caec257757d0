//! Chat-completion clients used for answer synthesis.
//!
//! Each query sends exactly one single-turn request (`role: user`, no
//! streaming) and returns the model's reply text verbatim. No timeout is
//! set on these requests.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::LlmConfig;

/// A language model that answers one prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier sent with each request.
    fn model_name(&self) -> &str;
    /// Send `prompt` as a single user message and return the reply.
    async fn chat(&self, prompt: &str) -> Result<String>;
}

fn user_message(model: &str, prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
        "stream": false
    })
}

// ============ Ollama ============

/// Client for Ollama's `POST /api/chat`.
pub struct OllamaChat {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(url: &str, model: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&user_message(&self.model, prompt))
            .send()
            .await
            .with_context(|| format!("Ollama connection error (is Ollama running at {}?)", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let body: OllamaChatResponse = response
            .json()
            .await
            .context("Invalid Ollama chat response")?;
        Ok(body.message.content)
    }
}

// ============ OpenAI-compatible ============

/// Client for an OpenAI-compatible `POST /v1/chat/completions` endpoint.
///
/// Sends `OPENAI_API_KEY` as a bearer token when it is set.
pub struct OpenAIChat {
    url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.url))
            .json(&user_message(&self.model, prompt));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Chat endpoint unreachable at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Chat API error {}: {}", status, body_text);
        }

        let body: CompletionResponse = response
            .json()
            .await
            .context("Invalid chat completion response")?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat completion response had no choices"))
    }
}

/// Create the configured [`ChatModel`].
pub fn create_chat_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaChat::new(&config.url, &config.model))),
        "openai" => Ok(Box::new(OpenAIChat::new(
            &config.url,
            &config.model,
            std::env::var("OPENAI_API_KEY").ok(),
        ))),
        other => bail!("Unknown llm provider: {}", other),
    }
}
