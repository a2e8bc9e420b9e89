//! Built-in prompt endpoint: keeps one dungeon master conversation per
//! session id and forwards it to the configured LLM providers.

use axum::{extract::State, http::StatusCode, Json};
use rand::distr::{Alphanumeric, SampleString};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::llm::{ChatTurn, GenerateRequest, LlmManager, DUNGEON_MASTER_PROMPT};
use crate::prompt::{
    LambdaEnvelope, PromptError, PromptReply, PromptRequest, PromptService, PromptWireBody,
    PromptWireRequest,
};
use crate::state::AppState;
use async_trait::async_trait;

const SESSION_ID_LENGTH: usize = 32;
/// Turns kept per conversation (user and assistant messages both count)
const MAX_HISTORY: usize = 16;
/// Oldest conversations are dropped beyond this
const MAX_CONVERSATIONS: usize = 256;

pub fn generate_session_id() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), SESSION_ID_LENGTH)
}

#[derive(Default)]
struct Conversations {
    turns: HashMap<String, VecDeque<ChatTurn>>,
    /// Session ids, least recently used first
    order: VecDeque<String>,
}

impl Conversations {
    fn history(&self, session_id: &str) -> Vec<ChatTurn> {
        self.turns
            .get(session_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&mut self, session_id: &str, user: ChatTurn, reply: ChatTurn) {
        let turns = self.turns.entry(session_id.to_string()).or_default();
        turns.push_back(user);
        turns.push_back(reply);
        while turns.len() > MAX_HISTORY {
            turns.pop_front();
        }

        // Only conversations that got a reply are tracked
        self.order.retain(|id| id != session_id);
        self.order.push_back(session_id.to_string());
        while self.order.len() > MAX_CONVERSATIONS {
            if let Some(evicted) = self.order.pop_front() {
                self.turns.remove(&evicted);
            }
        }
    }
}

pub struct PromptRelay {
    llm: LlmManager,
    conversations: Mutex<Conversations>,
    timeout: Duration,
    max_tokens: u32,
}

impl PromptRelay {
    pub fn new(llm: LlmManager, timeout: Duration, max_tokens: u32) -> Self {
        Self {
            llm,
            conversations: Mutex::new(Conversations::default()),
            timeout,
            max_tokens,
        }
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.lock().await.order.len()
    }

    pub async fn history_len(&self, session_id: &str) -> usize {
        self.conversations
            .lock()
            .await
            .turns
            .get(session_id)
            .map_or(0, |turns| turns.len())
    }
}

#[async_trait]
impl PromptService for PromptRelay {
    async fn send(&self, request: PromptRequest) -> Result<PromptReply, PromptError> {
        let session_id = request
            .session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_session_id);

        let user = ChatTurn::user(request.message);
        let mut messages = self.conversations.lock().await.history(&session_id);
        messages.push(user.clone());

        let response = self
            .llm
            .generate_with_fallback(GenerateRequest {
                system: DUNGEON_MASTER_PROMPT.to_string(),
                messages,
                max_tokens: Some(self.max_tokens),
                timeout: self.timeout,
            })
            .await
            .map_err(|e| PromptError::Service(e.to_string()))?;

        self.conversations.lock().await.record(
            &session_id,
            user,
            ChatTurn::assistant(response.text.clone()),
        );

        Ok(PromptReply {
            text: response.text,
            session_id: Some(session_id),
        })
    }

    fn name(&self) -> &str {
        "relay"
    }
}

fn envelope(status: StatusCode, body: PromptWireBody) -> Json<LambdaEnvelope> {
    Json(LambdaEnvelope {
        status_code: status.as_u16(),
        body: serde_json::to_string(&body).unwrap_or_default(),
    })
}

/// POST /api/prompt
///
/// Same contract as the hosted prompt function: `{message, sessionId}` in,
/// `{statusCode, body}` out, where body carries `{response, sessionId}` or
/// `{error}`.
pub async fn prompt_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PromptWireRequest>,
) -> (StatusCode, Json<LambdaEnvelope>) {
    let Some(relay) = state.relay.as_ref() else {
        let status = StatusCode::SERVICE_UNAVAILABLE;
        return (
            status,
            envelope(
                status,
                PromptWireBody {
                    error: Some("No LLM provider configured".to_string()),
                    ..Default::default()
                },
            ),
        );
    };

    let result = relay
        .send(PromptRequest {
            session_id: Some(request.session_id),
            message: request.message,
        })
        .await;

    match result {
        Ok(reply) => (
            StatusCode::OK,
            envelope(
                StatusCode::OK,
                PromptWireBody {
                    response: Some(reply.text),
                    session_id: reply.session_id,
                    error: None,
                },
            ),
        ),
        Err(e) => {
            tracing::error!("Prompt relay failed: {}", e);
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            (
                status,
                envelope(
                    status,
                    PromptWireBody {
                        error: Some(e.to_string()),
                        ..Default::default()
                    },
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerateResponse, LlmError, LlmProvider, LlmResult, ResponseMetadata};

    /// Echoes how many turns of history it was given
    struct Counting;

    #[async_trait]
    impl LlmProvider for Counting {
        async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
            Ok(GenerateResponse {
                text: format!("turns={}", request.messages.len()),
                metadata: ResponseMetadata {
                    provider: "counting".to_string(),
                    model: "test".to_string(),
                    tokens_used: None,
                    latency_ms: 0,
                },
            })
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct Down;

    #[async_trait]
    impl LlmProvider for Down {
        async fn generate(&self, _request: GenerateRequest) -> LlmResult<GenerateResponse> {
            Err(LlmError::ApiError("unavailable".to_string()))
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn relay() -> PromptRelay {
        PromptRelay::new(
            LlmManager::new(vec![Box::new(Counting)]),
            Duration::from_secs(5),
            100,
        )
    }

    #[test]
    fn test_session_id_shape() {
        let id = generate_session_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, generate_session_id());
    }

    #[tokio::test]
    async fn test_relay_keeps_conversation() {
        let relay = relay();

        let first = relay
            .send(PromptRequest {
                session_id: None,
                message: "Start".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(first.text, "turns=1");
        let session_id = first.session_id.unwrap();
        assert_eq!(session_id.len(), 32);

        let second = relay
            .send(PromptRequest {
                session_id: Some(session_id.clone()),
                message: "We open the door".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(second.text, "turns=3");
        assert_eq!(second.session_id.as_deref(), Some(session_id.as_str()));
        assert_eq!(relay.history_len(&session_id).await, 4);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let relay = relay();
        let session_id = Some("fixed".to_string());
        for i in 0..20 {
            relay
                .send(PromptRequest {
                    session_id: session_id.clone(),
                    message: format!("turn {}", i),
                })
                .await
                .unwrap();
        }
        assert_eq!(relay.history_len("fixed").await, MAX_HISTORY);
    }

    #[tokio::test]
    async fn test_failed_requests_leave_no_conversation() {
        let relay = PromptRelay::new(
            LlmManager::new(vec![Box::new(Down)]),
            Duration::from_secs(5),
            100,
        );
        for _ in 0..(MAX_CONVERSATIONS + 50) {
            let result = relay
                .send(PromptRequest {
                    session_id: None,
                    message: "Start".to_string(),
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(relay.conversation_count().await, 0);
    }

    #[tokio::test]
    async fn test_conversation_count_is_capped() {
        let relay = relay();
        for _ in 0..(MAX_CONVERSATIONS + 10) {
            relay
                .send(PromptRequest {
                    session_id: None,
                    message: "Start".to_string(),
                })
                .await
                .unwrap();
        }
        assert_eq!(relay.conversation_count().await, MAX_CONVERSATIONS);
        let conversations = relay.conversations.lock().await;
        assert_eq!(conversations.turns.len(), MAX_CONVERSATIONS);
    }
}
