//! Content Generator
//!
//! Turns an image plus an optional prompt into feed text using a vision-capable
//! chat model. The image travels inline as a base64 data URL.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{info, warn};

use crate::config::InferenceConfig;
use crate::llm::LLMAdapter;
use crate::models::{GeneratedContent, ImageInput};
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest};

const INSTRUCTION: &str = "Describe this image and generate a feed based on it.";

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_content(&self, prompt: Option<&str>, image: &ImageInput) -> AppResult<GeneratedContent>;
}

pub struct FeedGenerator {
    adapter: Arc<dyn LLMAdapter>,
    model: String,
    max_tokens: u32,
    max_image_bytes: usize,
}

impl FeedGenerator {
    pub fn new(adapter: Arc<dyn LLMAdapter>, config: &InferenceConfig, max_image_bytes: usize) -> Self {
        Self {
            adapter,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_image_bytes,
        }
    }

    fn build_request(&self, prompt: Option<&str>, image: &ImageInput) -> LLMRequest {
        LLMRequest {
            model: self.model.clone(),
            messages: vec![LLMMessage::user_with_base64_image(
                instruction_text(prompt),
                STANDARD.encode(&image.bytes),
                image.mime_type.clone(),
            )],
            max_tokens: Some(self.max_tokens),
            temperature: None,
        }
    }
}

#[async_trait]
impl ContentGenerator for FeedGenerator {
    async fn generate_content(&self, prompt: Option<&str>, image: &ImageInput) -> AppResult<GeneratedContent> {
        validate_image(image, self.max_image_bytes)?;

        info!(
            model = %self.model,
            image_bytes = image.bytes.len(),
            mime_type = %image.mime_type,
            has_prompt = prompt.is_some(),
            "Generating feed content"
        );

        let request = self.build_request(prompt, image);
        let response = self.adapter.create_chat_completion(&request).await.map_err(|e| {
            warn!(error = %e, "Inference request failed");
            match e {
                AppError::Inference(reason) => AppError::Inference(reason),
                other => AppError::Inference(other.to_string()),
            }
        })?;

        info!(
            content_len = response.content.len(),
            total_tokens = response.usage.total_tokens,
            "Feed content generated"
        );

        Ok(GeneratedContent {
            text: response.content,
            source_image: image.bytes.clone(),
            mime_type: image.mime_type.clone(),
        })
    }
}

/// User text sent ahead of the image
pub fn instruction_text(prompt: Option<&str>) -> String {
    match prompt.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prompt) => format!("{}. {}", prompt, INSTRUCTION),
        None => INSTRUCTION.to_string(),
    }
}

/// Reject empty, oversized and non-image uploads before anything goes upstream
pub fn validate_image(image: &ImageInput, max_bytes: usize) -> AppResult<()> {
    if image.bytes.is_empty() {
        return Err(AppError::validation("No image uploaded"));
    }
    if image.bytes.len() > max_bytes {
        return Err(AppError::validation(format!(
            "File too large: {} bytes exceeds the {} byte limit",
            image.bytes.len(),
            max_bytes
        )));
    }
    if !image.mime_type.starts_with("image/") {
        return Err(AppError::validation("Only images are allowed"));
    }
    Ok(())
}
