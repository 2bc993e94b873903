// OpenAI-compatible chat completions adapter
// Works against api.openai.com and any endpoint that speaks the same dialect
// (OpenRouter, Groq). Images are always sent inline as data URLs.

use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, ContentPart, LLMMessage, LLMRequest, LLMResponse, MessageContent, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAIAdapter {
    client: Client,
    api_key: String,
    api_base: String,
    timeout: Option<Duration>,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: ChatMessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ChatMessageContent {
    Text(String),
    Multimodal(Vec<ChatContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ChatContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl OpenAIAdapter {
    pub fn new_with_api_base(api_key: &str, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            timeout: None,
        }
    }

    /// Rebuild the HTTP client with a whole-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> AppResult<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Inference(format!("Failed to build HTTP client: {}", e)))?;
        self.timeout = Some(timeout);
        Ok(self)
    }

    fn convert_message(msg: &LLMMessage) -> ChatMessage {
        let content = match &msg.content {
            MessageContent::Text(text) => ChatMessageContent::Text(text.clone()),
            MessageContent::Multimodal(parts) => ChatMessageContent::Multimodal(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => ChatContentPart::Text { text: text.clone() },
                        ContentPart::ImageUrl { url, detail } => ChatContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: url.clone(),
                                detail: detail.clone(),
                            },
                        },
                        ContentPart::ImageBase64 { base64, media_type, detail } => ChatContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: format!("data:{};base64,{}", media_type, base64),
                                detail: detail.clone(),
                            },
                        },
                    })
                    .collect(),
            ),
        };

        ChatMessage {
            role: msg.role.clone(),
            content,
        }
    }

    fn describe_send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
            AppError::Inference(format!("request timed out after {}s", secs))
        } else {
            AppError::Inference(format!("request failed: {}", e))
        }
    }
}

#[async_trait]
impl LLMAdapter for OpenAIAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/chat/completions", self.api_base);

        let body = ChatRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(Self::convert_message).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.describe_send_error(e))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                return Err(AppError::Inference(match error_response.error.code {
                    Some(code) => format!(
                        "upstream error ({}): {} (code: {})",
                        status, error_response.error.message, code
                    ),
                    None => format!("upstream error ({}): {}", status, error_response.error.message),
                }));
            }

            return Err(AppError::Inference(format!(
                "upstream error ({}): {}",
                status, error_text
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.describe_send_error(e))?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Inference("model returned no choices".to_string()))?;

        let content = choice
            .message
            .content
            .ok_or_else(|| AppError::Inference("model returned an empty message".to_string()))?;

        let usage = chat_response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn vision_request() -> LLMRequest {
        LLMRequest {
            model: "gpt-4o".to_string(),
            messages: vec![LLMMessage::user_with_base64_image("Describe this", "aGVsbG8=", "image/png")],
            max_tokens: Some(500),
            temperature: None,
        }
    }

    #[test]
    fn test_base64_image_becomes_data_url() {
        let msg = LLMMessage::user_with_base64_image("hi", "aGVsbG8=", "image/jpeg");
        let converted = serde_json::to_value(OpenAIAdapter::convert_message(&msg)).unwrap();

        assert_eq!(converted["role"], "user");
        assert_eq!(converted["content"][0]["type"], "text");
        assert_eq!(converted["content"][1]["type"], "image_url");
        assert_eq!(
            converted["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,aGVsbG8="
        );
    }

    #[test]
    fn test_trailing_slash_trimmed_from_base() {
        let adapter = OpenAIAdapter::new_with_api_base("k", "http://localhost:9999/v1/");
        assert_eq!(adapter.api_base, "http://localhost:9999/v1");
    }

    #[tokio::test]
    async fn test_completion_returns_content_verbatim() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 500
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"  A warm sunset.\n"},"finish_reason":"stop"}],
                   "usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
            )
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new_with_api_base("test-key", &server.url());
        let response = adapter.create_chat_completion(&vision_request()).await.unwrap();

        assert_eq!(response.content, "  A warm sunset.\n");
        assert_eq!(response.usage.total_tokens, 15);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_upstream_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded"}}"#)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new_with_api_base("test-key", &server.url());
        let err = adapter.create_chat_completion(&vision_request()).await.unwrap_err();

        match err {
            AppError::Inference(reason) => {
                assert!(reason.contains("429"));
                assert!(reason.contains("Rate limit reached"));
            }
            other => panic!("expected inference failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_null_content_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":null},"finish_reason":"content_filter"}]}"#)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new_with_api_base("test-key", &server.url());
        let err = adapter.create_chat_completion(&vision_request()).await.unwrap_err();
        assert!(matches!(err, AppError::Inference(_)));
    }
}
