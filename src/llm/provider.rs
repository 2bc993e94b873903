use std::sync::Arc;

use async_trait::async_trait;
use crate::config::InferenceConfig;
use crate::llm::openai::OpenAIAdapter;
use crate::types::{LLMRequest, LLMResponse, AppResult};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Build the adapter for the configured provider.
///
/// Every supported provider speaks the OpenAI chat-completions dialect, so they
/// only differ by base URL. `base_url` in the config wins over the provider default.
pub fn adapter_from_config(config: &InferenceConfig) -> AppResult<Arc<dyn LLMAdapter>> {
    let api_base = config
        .base_url
        .clone()
        .unwrap_or_else(|| config.provider.default_base_url().to_string());

    if config.api_key.is_empty() {
        tracing::warn!(provider = %config.provider, "No API key configured for inference provider");
    }

    let adapter = OpenAIAdapter::new_with_api_base(&config.api_key, &api_base)
        .with_timeout(config.timeout)?;

    Ok(Arc::new(adapter))
}
