mod ollama;
mod openai;

use async_trait::async_trait;
use std::time::Duration;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),

    #[error("All providers failed")]
    AllFailed,
}

/// The dungeon master persona every provider is primed with
pub const DUNGEON_MASTER_PROMPT: &str = "You are the dungeon master of a fast, silly tabletop adventure played as a party game. \
    Write in second person plural, addressed to the whole party. \
    Keep every reply to at most four short sentences with no lists or headings. \
    Always end with a new situation the players must respond to, phrased as a question.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
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

/// Request to continue a conversation
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// System instructions
    pub system: String,
    /// Conversation so far, oldest first; the last turn is the user's
    pub messages: Vec<ChatTurn>,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    /// Timeout for the request
    pub timeout: Duration,
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
    /// Provider-specific metadata (model used, tokens consumed, etc.)
    pub metadata: ResponseMetadata,
}

/// Metadata about the LLM response
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Name of the provider (e.g., "openai", "ollama")
    pub provider: String,
    /// Model name used
    pub model: String,
    /// Tokens consumed (if available)
    pub tokens_used: Option<u32>,
    /// Latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate the next assistant message for the conversation
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Manager for multiple LLM providers
pub struct LlmManager {
    pub providers: Vec<Box<dyn LlmProvider>>,
}

impl LlmManager {
    /// Create a new LLM manager with the given providers
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Try each provider in order and return the first success
    pub async fn generate_with_fallback(
        &self,
        request: GenerateRequest,
    ) -> LlmResult<GenerateResponse> {
        for provider in &self.providers {
            match provider.generate(request.clone()).await {
                Ok(response) if !response.text.is_empty() => {
                    tracing::debug!(
                        "Provider {} ({}) answered in {}ms, tokens: {:?}",
                        response.metadata.provider,
                        response.metadata.model,
                        response.metadata.latency_ms,
                        response.metadata.tokens_used
                    );
                    return Ok(response);
                }
                Ok(_) => tracing::warn!("Provider {} returned an empty response", provider.name()),
                Err(e) => tracing::error!("Provider {} failed: {}", provider.name(), e),
            }
        }
        Err(LlmError::AllFailed)
    }
}

/// Configuration for LLM providers
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// OpenAI model to use
    pub openai_model: String,
    /// Ollama base URL
    pub ollama_base_url: Option<String>,
    /// Ollama model to use
    pub ollama_model: String,
    /// Default timeout for LLM requests
    pub default_timeout: Duration,
    /// Default max tokens for responses
    pub default_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            ollama_base_url: None,
            ollama_model: "llama3.2".to_string(),
            default_timeout: Duration::from_secs(30),
            default_max_tokens: 300,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_model: non_empty_var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            ollama_base_url: non_empty_var("OLLAMA_BASE_URL"),
            ollama_model: non_empty_var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            default_timeout: Duration::from_secs(crate::types::env_parse("LLM_TIMEOUT", 30)),
            default_max_tokens: crate::types::env_parse(
                "LLM_MAX_TOKENS",
                defaults.default_max_tokens,
            ),
        }
    }

    /// Build an LlmManager with all configured providers
    pub fn build_manager(&self) -> LlmResult<LlmManager> {
        let mut providers: Vec<Box<dyn LlmProvider>> = Vec::new();

        // Add OpenAI if API key is available
        if let Some(api_key) = &self.openai_api_key {
            providers.push(Box::new(OpenAiProvider::new(
                api_key.clone(),
                self.openai_model.clone(),
            )));
        }

        // Add Ollama if base URL is available
        if let Some(base_url) = &self.ollama_base_url {
            providers.push(Box::new(OllamaProvider::new(
                base_url.clone(),
                self.ollama_model.clone(),
            )?));
        }

        if providers.is_empty() {
            return Err(LlmError::ConfigError(
                "No LLM providers configured. Set OPENAI_API_KEY or OLLAMA_BASE_URL".to_string(),
            ));
        }

        Ok(LlmManager::new(providers))
    }
}
