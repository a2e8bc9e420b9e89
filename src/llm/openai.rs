use super::*;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use std::time::Instant;

/// OpenAI provider implementation
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider with the given API key and model
    pub fn new(api_key: String, model: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        let client = Client::with_config(config);

        Self { client, model }
    }
}

fn build_messages(request: &GenerateRequest) -> LlmResult<Vec<ChatCompletionRequestMessage>> {
    let mut messages: Vec<ChatCompletionRequestMessage> =
        Vec::with_capacity(request.messages.len() + 1);

    messages.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system.clone())
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?
            .into(),
    );

    for turn in &request.messages {
        let message: ChatCompletionRequestMessage = match turn.role {
            ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.content.clone())
                .build()
                .map_err(|e| LlmError::ApiError(e.to_string()))?
                .into(),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.clone())
                .build()
                .map_err(|e| LlmError::ApiError(e.to_string()))?
                .into(),
        };
        messages.push(message);
    }

    Ok(messages)
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
        let start = Instant::now();

        let mut req_builder = CreateChatCompletionRequestArgs::default();
        req_builder
            .model(&self.model)
            .messages(build_messages(&request)?);

        // Set max tokens if provided
        if let Some(max_tokens) = request.max_tokens {
            req_builder.max_completion_tokens(max_tokens);
        }

        let chat_request = req_builder
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        // Execute with timeout
        let response =
            tokio::time::timeout(request.timeout, self.client.chat().create(chat_request))
                .await
                .map_err(|_| LlmError::Timeout(request.timeout))?
                .map_err(|e| LlmError::ApiError(e.to_string()))?;

        // Extract the generated text
        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LlmError::ParseError("No content in response".to_string()))?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let tokens_used = response.usage.map(|u| u.total_tokens);

        Ok(GenerateResponse {
            text: text.trim().to_string(),
            metadata: ResponseMetadata {
                provider: "openai".to_string(),
                model: self.model.clone(),
                tokens_used,
                latency_ms,
            },
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}
