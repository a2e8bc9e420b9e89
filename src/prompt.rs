//! Client side of the prompt service: the HTTP endpoint that wraps a language
//! model and keeps one conversation per room.

use crate::relay::PromptRelay;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Prompt service returned status {0}")]
    Status(u16),

    #[error("Prompt service error: {0}")]
    Service(String),

    #[error("Invalid response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    /// Conversation to continue; None starts a new one
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptReply {
    pub text: String,
    pub session_id: Option<String>,
}

impl PromptReply {
    pub fn fallback() -> Self {
        Self {
            text: crate::state::FALLBACK_PROMPT.to_string(),
            session_id: None,
        }
    }
}

#[async_trait]
pub trait PromptService: Send + Sync {
    async fn send(&self, request: PromptRequest) -> Result<PromptReply, PromptError>;

    fn name(&self) -> &str;
}

/// `{"message", "sessionId"}` as posted to the prompt endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptWireRequest {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "sessionId", default)]
    pub session_id: String,
}

/// Inner body of a prompt endpoint response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptWireBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Lambda-style wrapper: the real body is a JSON string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

/// Interpret a prompt endpoint response. Accepts either the Lambda envelope
/// or a bare `{response, sessionId}` object.
pub fn parse_reply(status: u16, raw: &str) -> Result<PromptReply, PromptError> {
    let (status, body) = match serde_json::from_str::<LambdaEnvelope>(raw) {
        Ok(envelope) => (envelope.status_code, envelope.body),
        Err(_) => (status, raw.to_string()),
    };

    let body: Option<PromptWireBody> = serde_json::from_str(&body).ok();

    if let Some(error) = body.as_ref().and_then(|b| b.error.clone()) {
        return Err(PromptError::Service(error));
    }
    if !(200..300).contains(&status) {
        return Err(PromptError::Status(status));
    }

    let body = body.ok_or_else(|| PromptError::Parse("Body is not a prompt object".to_string()))?;
    let text = body
        .response
        .ok_or_else(|| PromptError::Parse("Missing 'response' field".to_string()))?;

    Ok(PromptReply {
        text,
        session_id: body.session_id.filter(|id| !id.is_empty()),
    })
}

/// Talks to an external prompt endpoint over HTTP
pub struct HttpPromptService {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPromptService {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl PromptService for HttpPromptService {
    async fn send(&self, request: PromptRequest) -> Result<PromptReply, PromptError> {
        let body = PromptWireRequest {
            message: request.message,
            session_id: request.session_id.unwrap_or_default(),
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.client.post(&self.url).json(&body).send(),
        )
        .await
        .map_err(|_| PromptError::Timeout(self.timeout))?
        .map_err(|e| PromptError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let raw = response
            .text()
            .await
            .map_err(|e| PromptError::Request(e.to_string()))?;

        parse_reply(status, &raw)
    }

    fn name(&self) -> &str {
        "http"
    }
}

const STATIC_SCENARIOS: &[&str] = &[
    "A goblin merchant blocks the corridor and insists you buy exactly one of his three cursed hats before you may pass. What do you do?",
    "The floor of the treasure room turns out to be a sleeping gelatinous cube. The gold is inside it. What do you do?",
    "A talking door refuses to open until someone tells it a secret nobody else in the party knows. What do you do?",
    "The dragon you were sent to slay is crying because nobody came to its birthday party. What do you do?",
    "Your torch goes out and something in the dark politely asks whether you need a light. What do you do?",
];

/// Canned scenarios served in rotation when no model is reachable
pub struct StaticPromptService {
    scenarios: Vec<String>,
    next: AtomicUsize,
}

impl StaticPromptService {
    pub fn new(scenarios: Vec<String>) -> Self {
        Self {
            scenarios,
            next: AtomicUsize::new(0),
        }
    }
}

impl Default for StaticPromptService {
    fn default() -> Self {
        Self::new(STATIC_SCENARIOS.iter().map(|s| s.to_string()).collect())
    }
}

#[async_trait]
impl PromptService for StaticPromptService {
    async fn send(&self, request: PromptRequest) -> Result<PromptReply, PromptError> {
        if self.scenarios.is_empty() {
            return Err(PromptError::Service("No scenarios configured".to_string()));
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.scenarios.len();
        Ok(PromptReply {
            text: self.scenarios[index].clone(),
            session_id: request.session_id,
        })
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[derive(Debug, Clone)]
pub struct PromptConfig {
    /// External prompt endpoint; takes precedence over everything else
    pub service_url: Option<String>,
    pub timeout: Duration,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            service_url: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PromptConfig {
    pub fn from_env() -> Self {
        let service_url = std::env::var("PROMPT_SERVICE_URL").ok().and_then(|url| {
            let trimmed = url.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        Self {
            service_url,
            timeout: Duration::from_secs(crate::types::env_parse("PROMPT_TIMEOUT", 30)),
        }
    }

    /// Pick the prompt source: external endpoint, then the built-in relay,
    /// then the canned scenarios
    pub fn build_service(&self, relay: Option<Arc<PromptRelay>>) -> Arc<dyn PromptService> {
        if let Some(url) = &self.service_url {
            tracing::info!("Using prompt service at {}", url);
            return Arc::new(HttpPromptService::new(url.clone(), self.timeout));
        }
        if let Some(relay) = relay {
            tracing::info!("Using built-in prompt relay");
            return relay;
        }
        tracing::warn!("No prompt service or LLM provider configured, using canned scenarios");
        Arc::new(StaticPromptService::default())
    }
}
