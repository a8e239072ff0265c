//! Chat-completion client used to generate the analysis text. All supported
//! providers speak the OpenAI-compatible `/chat/completions` wire format.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument};

/// Fixed persona for the generation call. The user text (the situation) is
/// sent as the sole user message.
pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are an experienced psychologist and an expert on \
limiting beliefs. Analyze the following problem and identify the 3 most important limiting core \
beliefs that could be behind it. Phrase them in the first person.";

const ANALYSIS_TEMPERATURE: f64 = 0.7;
const ANALYSIS_MAX_TOKENS: u32 = 500;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm generation is disabled (LLM_ENABLED=0)")]
    Disabled,
    #[error("llm request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("llm provider returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("llm response missing analysis text")]
    MalformedResponse,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        fn provider_defaults(provider: &str) -> (String, String) {
            match provider.to_ascii_lowercase().as_str() {
                "deepseek" => (
                    "deepseek-chat".into(),
                    "https://api.deepseek.com/chat/completions".into(),
                ),
                "mistral" => (
                    "mistral-large-latest".into(),
                    "https://api.mistral.ai/v1/chat/completions".into(),
                ),
                "xai" => (
                    "grok-2-latest".into(),
                    "https://api.x.ai/v1/chat/completions".into(),
                ),
                _ => (
                    "gpt-4o-mini".into(),
                    "https://api.openai.com/v1/chat/completions".into(),
                ),
            }
        }

        fn provider_api_key(provider: &str) -> Option<String> {
            match provider.to_ascii_lowercase().as_str() {
                "openai" => std::env::var("OPENAI_API_KEY").ok(),
                "deepseek" => std::env::var("DEEPSEEK_API_KEY").ok(),
                "mistral" => std::env::var("MISTRAL_API_KEY").ok(),
                "xai" => std::env::var("XAI_API_KEY").ok(),
                _ => None,
            }
        }

        fn parse_bool(key: &str, default: bool) -> bool {
            match std::env::var(key) {
                Ok(val) => matches!(val.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
                Err(_) => default,
            }
        }

        let provider = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".into());
        let (default_model, default_endpoint) = provider_defaults(&provider);

        let api_key = std::env::var("LLM_API_KEY")
            .ok()
            .or_else(|| provider_api_key(&provider))
            .unwrap_or_default();

        Self {
            enabled: parse_bool("LLM_ENABLED", true),
            model: std::env::var("LLM_MODEL").unwrap_or(default_model),
            endpoint: std::env::var("LLM_ENDPOINT").unwrap_or(default_endpoint),
            api_key,
            timeout_secs: std::env::var("LLM_TIMEOUT_SECONDS")
                .ok()
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(30),
            provider,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self, LlmError> {
        Self::new(LlmConfig::from_env())
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// One synchronous chat-completion round trip: system prompt + situation
    /// in, analysis text out. The caller's request stays open for the full
    /// duration; there is no queueing or background retry.
    #[instrument(skip(self, situation), fields(provider = %self.config.provider, model = %self.config.model))]
    pub async fn generate_analysis(&self, situation: &str) -> Result<String, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": ANALYSIS_SYSTEM_PROMPT },
                { "role": "user", "content": situation },
            ],
            "temperature": ANALYSIS_TEMPERATURE,
            "max_tokens": ANALYSIS_MAX_TOKENS,
        });

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::MalformedResponse)?;

        info!(chars = text.len(), "generated analysis");
        Ok(text)
    }
}
