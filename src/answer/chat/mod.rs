
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use super::LanguageModel;
use crate::config::LlmConfig;
use crate::{RagError, Result};

/// Blocking client for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    endpoint: Url,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    api_key: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    #[inline]
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{}/chat/completions", base))
            .with_context(|| format!("Invalid chat completions base URL {}", config.base_url))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();

        Ok(Self {
            endpoint,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
            agent,
        })
    }

    /// Build a client reading the API key from the configured environment variable
    #[inline]
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        config.validate()?;
        let api_key = config.api_key()?;
        Self::new(config, api_key)
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn send(&self, prompt: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        let response_text = self
            .agent
            .post(self.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(&request_json)
            .with_context(|| format!("Failed to call chat completions at {}", self.endpoint))?
            .body_mut()
            .read_to_string()
            .context("Failed to read chat completions response")?;

        let parsed: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat completions response")?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .context("Chat completions response has no message content")
    }
}

impl LanguageModel for ChatCompletionsClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        debug!("Requesting completion from {}", self.model);
        self.send(prompt).map_err(|e| {
            error!("Chat completion failed: {:#}", e);
            RagError::AnswerGeneration(format!("{:#}", e))
        })
    }
}
