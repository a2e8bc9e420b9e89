use super::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Ollama provider implementation
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider with the given base URL and model
    pub fn new(base_url: String, model: String) -> LlmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }

    fn build_chat(&self, request: &GenerateRequest) -> OllamaChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(OllamaMessage {
            role: "system".to_string(),
            content: request.system.clone(),
        });
        messages.extend(request.messages.iter().map(|turn| OllamaMessage {
            role: match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            }
            .to_string(),
            content: turn.content.clone(),
        }));

        OllamaChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            options: request.max_tokens.map(|num_predict| OllamaOptions {
                num_predict: Some(num_predict),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
        let start = Instant::now();
        let chat_request = self.build_chat(&request);
        let url = format!("{}/api/chat", self.base_url);

        // Execute with timeout
        let response = tokio::time::timeout(
            request.timeout,
            self.client.post(&url).json(&chat_request).send(),
        )
        .await
        .map_err(|_| LlmError::Timeout(request.timeout))?
        .map_err(|e| LlmError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ApiError(format!(
                "Ollama API returned status: {}",
                response.status()
            )));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let latency_ms = start.elapsed().as_millis() as u64;

        Ok(GenerateResponse {
            text: chat_response.message.content.trim().to_string(),
            metadata: ResponseMetadata {
                provider: "ollama".to_string(),
                model: self.model.clone(),
                tokens_used: chat_response.eval_count,
                latency_ms,
            },
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
