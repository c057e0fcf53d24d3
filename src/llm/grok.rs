//! Grok chat completions over the xAI HTTP API.
//!
//! The endpoint is OpenAI-compatible: `POST {base}/chat/completions` with a
//! bearer key. Transient failures (transport, 429, 5xx) are retried up to the
//! configured bound.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use crate::retry::retry_with_backoff;

/// xAI API base URL.
pub const XAI_API_BASE: &str = "https://api.x.ai/v1";

const PROVIDER: &str = "grok";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Grok provider.
pub struct GrokProvider {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    max_retries: u32,
}

impl GrokProvider {
    pub fn new(api_key: SecretString, model: impl Into<String>, max_retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_key,
            model: model.into(),
            base_url: XAI_API_BASE.to_string(),
            max_retries,
        }
    }

    /// Point the provider at another OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn send_once(&self, body: &ChatRequestBody<'_>) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: format!("failed to read body: {e}"),
        })?;

        check_status(status, retry_after, &text)?;
        parse_completion(&text)
    }
}

#[async_trait]
impl LlmProvider for GrokProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatRequestBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(model = %self.model, messages = request.messages.len(), "Grok request");

        retry_with_backoff(self.max_retries, "grok.chat_completions", || self.send_once(&body)).await
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Map an HTTP status to the error taxonomy.
fn check_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Result<(), LlmError> {
    if status.is_success() {
        return Ok(());
    }
    let provider = PROVIDER.to_string();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthFailed { provider },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited { provider, retry_after },
        s if s.is_server_error() => LlmError::Unavailable {
            provider,
            status: s.as_u16(),
        },
        s => LlmError::InvalidResponse {
            provider,
            reason: format!("HTTP {}: {}", s.as_u16(), body.chars().take(200).collect::<String>()),
        },
    })
}

/// Parse a chat-completions body; a missing message yields empty content.
fn parse_completion(text: &str) -> Result<CompletionResponse, LlmError> {
    let body: ChatResponseBody = serde_json::from_str(text)?;
    let first = body.choices.into_iter().next().ok_or_else(|| LlmError::InvalidResponse {
        provider: PROVIDER.to_string(),
        reason: "no choices in response".to_string(),
    })?;
    let usage = body.usage.unwrap_or_default();

    Ok(CompletionResponse {
        content: first.message.and_then(|m| m.content).unwrap_or_default(),
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        finish_reason: FinishReason::parse(first.finish_reason.as_deref()),
        response_id: body.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hello")];
        let body = ChatRequestBody {
            model: "grok-beta",
            messages: &messages,
            temperature: Some(0.7),
            max_tokens: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "grok-beta");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert!(json.get("max_tokens").is_none());
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn parses_completion() {
        let raw = r#"{
            "id": "resp-1",
            "choices": [{"message": {"role": "assistant", "content": "{\"action\": \"analyze\"}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30}
        }"#;
        let response = parse_completion(raw).unwrap();
        assert_eq!(response.content, r#"{"action": "analyze"}"#);
        assert_eq!(response.input_tokens, 120);
        assert_eq!(response.output_tokens, 30);
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.response_id.as_deref(), Some("resp-1"));
    }

    #[test]
    fn missing_message_content_is_empty() {
        let response = parse_completion(r#"{"choices": [{}]}"#).unwrap();
        assert_eq!(response.content, "");
    }

    #[test]
    fn empty_choices_is_invalid() {
        assert!(matches!(
            parse_completion(r#"{"choices": []}"#),
            Err(LlmError::InvalidResponse { .. })
        ));
        assert!(matches!(parse_completion("not json"), Err(LlmError::Json(_))));
    }

    #[test]
    fn status_mapping() {
        assert!(check_status(StatusCode::OK, None, "").is_ok());
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED, None, ""),
            Err(LlmError::AuthFailed { .. })
        ));
        assert!(matches!(
            check_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(3)), ""),
            Err(LlmError::RateLimited { retry_after: Some(_), .. })
        ));
        assert!(matches!(
            check_status(StatusCode::BAD_GATEWAY, None, ""),
            Err(LlmError::Unavailable { status: 502, .. })
        ));
        assert!(matches!(
            check_status(StatusCode::BAD_REQUEST, None, "bad model"),
            Err(LlmError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_without_retries() {
        let provider = GrokProvider::new(SecretString::from("xai-test"), "grok-beta", 0)
            .with_base_url("http://127.0.0.1:9/v1/");
        assert_eq!(provider.model_name(), "grok-beta");

        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        let err = provider.complete(request).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
    }
}
