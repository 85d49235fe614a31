use super::*;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use futures::StreamExt;

/// OpenAI-backed generation engine
pub struct OpenAiEngine {
    client: Client<OpenAIConfig>,
    model: String,
}

const TEMPERATURE: f32 = 0.5;

impl OpenAiEngine {
    /// Create a new engine with the given API key and model
    pub fn new(api_key: String, model: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        let client = Client::with_config(config);

        Self { client, model }
    }
}

#[async_trait]
impl CompletionEngine for OpenAiEngine {
    async fn stream(&self, request: CompletionRequest) -> EngineResult<TokenStream> {
        let (system_prompt, user_prompt) = build_prompts(&request);

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|e| EngineError::ApiError(e.to_string()))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_prompt)
                    .build()
                    .map_err(|e| EngineError::ApiError(e.to_string()))?
                    .into(),
            ])
            .temperature(TEMPERATURE)
            .max_tokens(request.max_tokens)
            .stream(true)
            .build()
            .map_err(|e| EngineError::ApiError(e.to_string()))?;

        // Opening the stream is bounded; the fragments themselves arrive at
        // provider pace.
        let upstream = tokio::time::timeout(
            request.timeout,
            self.client.chat().create_stream(chat_request),
        )
        .await
        .map_err(|_| EngineError::Timeout(request.timeout))?
        .map_err(|e| EngineError::ApiError(e.to_string()))?;

        let fragments = upstream.filter_map(|item| async move {
            match item {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|content| !content.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(EngineError::ApiError(e.to_string()))),
            }
        });

        Ok(Box::pin(fragments))
    }

    fn name(&self) -> &str {
        "openai"
    }
}
