/// LLM Client: the generative-text port used by every content-producing stage.
///
/// ARCHITECTURAL RULE: stages never talk to the provider directly. They hold an
/// `Arc<dyn GenerativePort>` and go through `call_structured`.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{LlmSettings, ModelSettings};
use crate::errors::AppError;

pub mod prompts;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// One system/user instruction pair sent to the model.
#[derive(Debug, Clone)]
pub struct PromptRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub model: &'a ModelSettings,
    /// Ask the provider for a JSON object instead of free text.
    pub structured: bool,
}

/// The contract every content-producing stage depends on.
#[async_trait]
pub trait GenerativePort: Send + Sync {
    /// Sends the request and returns the raw text of the model's answer.
    async fn complete(&self, request: &PromptRequest<'_>) -> Result<String, LlmError>;

    /// Number of transport retries spent so far.
    fn retries_used(&self) -> u32 {
        0
    }
}

/// Outcome of a structured call. Callers must decide what a parse failure means.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOutput<T> {
    ParsedOk(T),
    ParseFailed { raw: String, reason: String },
}

impl<T> StructuredOutput<T> {
    /// Converts a parse failure into `AppError::MalformedOutput` for the given stage.
    pub fn into_result(self, stage: &'static str) -> Result<T, AppError> {
        match self {
            StructuredOutput::ParsedOk(value) => Ok(value),
            StructuredOutput::ParseFailed { raw, reason } => {
                debug!("Unparseable {stage} output: {raw}");
                Err(AppError::MalformedOutput { stage, reason })
            }
        }
    }
}

/// Structured call: requests a JSON object and deserializes it into `T`.
/// Transport failures are `Err`; a reply that does not fit `T` is `ParseFailed`.
pub async fn call_structured<T: DeserializeOwned + Send>(
    port: &dyn GenerativePort,
    system: &str,
    user: &str,
    model: &ModelSettings,
) -> Result<StructuredOutput<T>, LlmError> {
    let request = PromptRequest {
        system,
        user,
        model,
        structured: true,
    };
    let raw = port.complete(&request).await?;
    Ok(parse_structured(&raw))
}

pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> StructuredOutput<T> {
    match serde_json::from_str::<T>(strip_json_fences(raw)) {
        Ok(value) => StructuredOutput::ParsedOk(value),
        Err(e) => StructuredOutput::ParseFailed {
            raw: raw.to_string(),
            reason: e.to_string(),
        },
    }
}

/// Deserializes `null` as the type's default. Pair with `#[serde(default)]` for absent keys.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible chat completions client
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice, if any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Chat-completions client with retry logic. Retries HTTP failures, 429 and 5xx
/// with exponential backoff; other non-success statuses fail immediately.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    settings: LlmSettings,
    retries: Arc<AtomicU32>,
}

impl LlmClient {
    pub fn new(api_key: String, settings: LlmSettings) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            settings,
            retries: Arc::new(AtomicU32::new(0)),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    /// Backoff before retry `attempt` (1-based): base, 2×base, 4×base, ...
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.settings.retry_base_delay_ms << (attempt - 1).min(16))
    }

    async fn call(&self, request: &PromptRequest<'_>) -> Result<ChatResponse, LlmError> {
        let body = ChatRequest {
            model: &request.model.name,
            temperature: request.model.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            response_format: request.structured.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let attempts = self.settings.max_retries.max(1);
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                self.retries.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let chat: ChatResponse = response.json().await?;

            if let Some(usage) = &chat.usage {
                debug!(
                    "LLM call succeeded: model={}, prompt_tokens={}, completion_tokens={}",
                    request.model.name, usage.prompt_tokens, usage.completion_tokens
                );
            }

            return Ok(chat);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited { retries: attempts }))
    }
}

#[async_trait]
impl GenerativePort for LlmClient {
    async fn complete(&self, request: &PromptRequest<'_>) -> Result<String, LlmError> {
        let response = self.call(request).await?;
        response
            .text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }

    fn retries_used(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }
}

/// Removes a markdown code fence around the model's JSON, tagged or not.
/// A missing closing fence is tolerated.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(body) = text.strip_prefix("```") else {
        return text;
    };
    let body = match body.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &body[4..],
        _ => body,
    };
    let body = body.trim();
    body.strip_suffix("```").unwrap_or(body).trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPort;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Gate {
        gate_passed: bool,
        #[serde(default, deserialize_with = "nullable")]
        missing_topics: Vec<String>,
    }

    #[test]
    fn test_strip_json_fences_tagged_and_untagged() {
        assert_eq!(strip_json_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_json_fences("```JSON {\"a\": 1} ```"), "{\"a\": 1}");
        assert_eq!(strip_json_fences("```\n[1, 2]\n```"), "[1, 2]");
    }

    #[test]
    fn test_strip_json_fences_tolerates_sloppy_fences() {
        // Leading whitespace before the fence and a reply cut off before the closing fence
        assert_eq!(strip_json_fences("  \n```json\n{\"a\": 1}\n```\n  "), "{\"a\": 1}");
        assert_eq!(strip_json_fences("```json\n{\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_json_fences_leaves_plain_json_alone() {
        assert_eq!(strip_json_fences(" {\"a\": \"```\"} "), "{\"a\": \"```\"}");
    }

    #[test]
    fn test_parse_structured_ok_through_fences() {
        let parsed: StructuredOutput<Gate> =
            parse_structured("```json\n{\"gate_passed\": true, \"missing_topics\": []}\n```");
        assert_eq!(
            parsed,
            StructuredOutput::ParsedOk(Gate {
                gate_passed: true,
                missing_topics: vec![],
            })
        );
    }

    #[test]
    fn test_parse_structured_failure_keeps_raw() {
        let parsed: StructuredOutput<Gate> = parse_structured("Sure! Here is your JSON:");
        match parsed {
            StructuredOutput::ParseFailed { raw, reason } => {
                assert_eq!(raw, "Sure! Here is your JSON:");
                assert!(!reason.is_empty());
            }
            other => panic!("expected ParseFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_nullable_maps_null_to_default() {
        let parsed: Gate =
            serde_json::from_str(r#"{"gate_passed": false, "missing_topics": null}"#).unwrap();
        assert!(parsed.missing_topics.is_empty());
    }

    #[test]
    fn test_into_result_maps_failure_to_malformed_output() {
        let out: StructuredOutput<Gate> = StructuredOutput::ParseFailed {
            raw: "nope".to_string(),
            reason: "expected value".to_string(),
        };
        let err = out.into_result("critic").unwrap_err();
        assert!(matches!(err, AppError::MalformedOutput { stage: "critic", .. }));
    }

    #[test]
    fn test_chat_response_text_skips_blank_content() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "   "}}], "usage": null}"#,
        )
        .unwrap();
        assert!(response.text().is_none());

        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "{\"a\": 1}"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 3}}"#,
        )
        .unwrap();
        assert_eq!(response.text(), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_request_body_sets_json_response_format_only_when_structured() {
        let model = ModelSettings::default();
        let structured = ChatRequest {
            model: &model.name,
            temperature: model.temperature,
            messages: vec![],
            response_format: Some(ResponseFormat {
                format_type: "json_object",
            }),
        };
        let value = serde_json::to_value(&structured).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");

        let plain = ChatRequest {
            model: &model.name,
            temperature: model.temperature,
            messages: vec![],
            response_format: None,
        };
        let value = serde_json::to_value(&plain).unwrap();
        assert!(value.get("response_format").is_none());
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let client = LlmClient::new(
            "test-key".to_string(),
            LlmSettings {
                retry_base_delay_ms: 100,
                ..LlmSettings::default()
            },
        )
        .unwrap();
        assert_eq!(client.backoff(1), Duration::from_millis(100));
        assert_eq!(client.backoff(2), Duration::from_millis(200));
        assert_eq!(client.backoff(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_call_structured_marks_request_structured() {
        let port = ScriptedPort::new(vec![r#"{"gate_passed": true}"#]);
        let model = ModelSettings::default();
        let out: StructuredOutput<Gate> = call_structured(&port, "sys", "user", &model)
            .await
            .unwrap();
        assert!(matches!(out, StructuredOutput::ParsedOk(Gate { gate_passed: true, .. })));
        let requests = port.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].structured);
        assert_eq!(requests[0].system, "sys");
    }
}
