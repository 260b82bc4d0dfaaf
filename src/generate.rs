//! Answer generation backends.
//!
//! The chat path hands the augmented prompt to a [`Generator`]. A failed
//! generation is never an error for the client: [`Engine::chat`] swaps in
//! [`APOLOGY`] instead.
//!
//! [`Engine::chat`]: crate::engine::Engine::chat

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Returned to the client when the generator fails.
pub const APOLOGY: &str = "Sorry, I could not generate a response. Please try again.";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions \
based on the provided contexts. If the contexts do not contain the requested information, \
state clearly that you cannot answer the question with the available data.";

/// Generated answer plus the backend's conversation state.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Opaque token array to send back as `history` on the next turn.
    pub context: Option<Vec<i64>>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, history: Option<Vec<i64>>) -> Result<Generation>;
}

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// Calls `POST /api/generate` on an Ollama instance with streaming off.
pub struct OllamaGenerator {
    model: String,
    url: String,
    system_prompt: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Vec<i64>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    context: Option<Vec<i64>>,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            client,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str, history: Option<Vec<i64>>) -> Result<Generation> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            system: &self.system_prompt,
            stream: false,
            context: history.filter(|h| !h.is_empty()),
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(Generation {
            text: strip_reasoning(&parsed.response),
            context: parsed.context,
        })
    }
}

/// Always fails; the chat path then answers with [`APOLOGY`].
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn generate(&self, _prompt: &str, _history: Option<Vec<i64>>) -> Result<Generation> {
        bail!("generation is disabled (generation.provider = \"disabled\")")
    }
}

/// Drop everything between the first `<think>` and the last `</think>`,
/// then trim.
pub fn strip_reasoning(text: &str) -> String {
    match (text.find("<think>"), text.rfind("</think>")) {
        (Some(open), Some(close)) if open <= close => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..open]);
            out.push_str(&text[close + "</think>".len()..]);
            out.trim().to_string()
        }
        _ => text.trim().to_string(),
    }
}
