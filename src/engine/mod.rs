mod openai;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;

pub use openai::OpenAiEngine;

use crate::protocol::ChatMode;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while driving a generation
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// A lazy, finite sequence of text fragments. Dropping the stream cancels
/// any remaining upstream work.
pub type TokenStream = Pin<Box<dyn Stream<Item = EngineResult<String>> + Send>>;

/// Request to stream a generation
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The user's prompt text
    pub prompt: String,
    /// Assistant mode, selects the prompt template
    pub mode: ChatMode,
    /// Code the debug/explain templates operate on
    pub code_context: Option<String>,
    /// Maximum response length in tokens
    pub max_tokens: u32,
    /// Timeout for establishing the stream
    pub timeout: Duration,
}

/// Trait every generation backend must implement
#[async_trait]
pub trait CompletionEngine: Send + Sync {
    /// Open a fragment stream for the given request
    async fn stream(&self, request: CompletionRequest) -> EngineResult<TokenStream>;

    /// Get the name of this engine
    fn name(&self) -> &str;
}

/// System/user prompt pair for one request.
pub(crate) fn build_prompts(request: &CompletionRequest) -> (String, String) {
    let code = request.code_context.as_deref().unwrap_or_default();
    match request.mode {
        ChatMode::Generate => (
            "You are an expert programmer. Generate clean, well-commented code \
             based on the user's request."
                .to_string(),
            request.prompt.clone(),
        ),
        ChatMode::Debug => (
            "You are an expert debugger. Analyze the code and provide fixes.".to_string(),
            format!("Debug this code:\n\n{}\n\nIssue: {}", code, request.prompt),
        ),
        ChatMode::Explain => (
            "You are a programming instructor. Explain code clearly and educationally."
                .to_string(),
            format!("Explain this code:\n\n{}\n\nFocus: {}", code, request.prompt),
        ),
    }
}

/// Configuration for the generation engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// Model to use
    pub model: String,
    /// Default max tokens for responses
    pub default_max_tokens: u32,
    /// Timeout for opening a stream
    pub default_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            default_max_tokens: 2000,
            default_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().and_then(|key| {
            let trimmed = key.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        let model = std::env::var("OPENAI_MODEL")
            .ok()
            .and_then(|model| {
                let trimmed = model.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| "gpt-3.5-turbo".to_string());

        Self {
            openai_api_key,
            model,
            default_max_tokens: std::env::var("LLM_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2000),
            default_timeout: std::env::var("LLM_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(30)),
        }
    }

    /// Build the configured engine
    pub fn build_engine(&self) -> EngineResult<OpenAiEngine> {
        let api_key = self.openai_api_key.as_ref().ok_or_else(|| {
            EngineError::ConfigError("No generation engine configured. Set OPENAI_API_KEY".into())
        })?;

        Ok(OpenAiEngine::new(api_key.clone(), self.model.clone()))
    }

    /// Request parameters for one generation, from the configured defaults.
    pub fn request(&self, prompt: String, mode: ChatMode, code_context: Option<String>) -> CompletionRequest {
        CompletionRequest {
            prompt,
            mode,
            code_context,
            max_tokens: self.default_max_tokens,
            timeout: self.default_timeout,
        }
    }
}
