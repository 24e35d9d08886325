//! OpenAI-compatible provider implementation.
//!
//! Works with any server exposing `/v1/chat/completions`: llama.cpp server,
//! LM Studio, vLLM, Ollama and OpenAI itself.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Model listing and health checks

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use llamaskill_core::error::ProviderError;
use llamaskill_core::message::Message;
use llamaskill_core::provider::{ChunkReceiver, ProviderRequest, ProviderResponse, StreamChunk};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    ///
    /// `timeout` bounds each request including the streamed body; `None`
    /// waits indefinitely.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ProviderError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// The endpoint root, e.g. `http://localhost:9001/v1`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List the models the server reports.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: Some(m.content.clone()),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        })
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        accept: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", accept)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl llamaskill_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let body = Self::request_body(&request, false);
        let response = self.post(&body, "application/json").await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(ProviderResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            model: api_response.model.unwrap_or(request.model),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending streaming request"
        );

        let body = Self::request_body(&request, true);
        let response = self.post(&body, "text/event-stream").await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    match parse_sse_line(&line) {
                        SseItem::Skip => {}
                        SseItem::Done => {
                            let _ = tx
                                .send(Ok(StreamChunk {
                                    content: None,
                                    done: true,
                                }))
                                .await;
                            return;
                        }
                        SseItem::Content(content) => {
                            let chunk = StreamChunk {
                                content: Some(content),
                                done: false,
                            };
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseItem::Error(error) => {
                            warn!(
                                provider = %provider_name,
                                error = %error,
                                "Stream aborted by the server"
                            );
                            let _ = tx.send(Err(ProviderError::StreamInterrupted(error))).await;
                            return;
                        }
                    }
                }
            }

            // Stream ended without [DONE]: send final chunk
            let _ = tx
                .send(Ok(StreamChunk {
                    content: None,
                    done: true,
                }))
                .await;
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(map_transport_error)?;

        Ok(response.status().is_success())
    }
}

// --- SSE framing ---

/// Splits a byte stream into text lines.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across network chunks decode intact.
#[derive(Default)]
struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }
}

#[derive(Debug, PartialEq)]
enum SseItem {
    Skip,
    Done,
    Content(String),
    /// The server reported an error or sent a chunk that is not JSON.
    Error(String),
}

fn parse_sse_line(line: &str) -> SseItem {
    // Skip empty lines, SSE comments and non-data fields
    let Some(data) = line.strip_prefix("data:") else {
        return SseItem::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return SseItem::Done;
    }

    let stream_resp = match serde_json::from_str::<StreamResponse>(data) {
        Ok(stream_resp) => stream_resp,
        Err(e) => return SseItem::Error(format!("malformed stream chunk: {e}")),
    };

    if let Some(error) = stream_resp.error {
        let message = error["message"]
            .as_str()
            .or_else(|| error.as_str())
            .map_or_else(|| error.to_string(), String::from);
        return SseItem::Error(message);
    }

    stream_resp
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map_or(SseItem::Skip, SseItem::Content)
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use llamaskill_core::Provider;

    fn provider() -> OpenAiCompatProvider {
        OpenAiCompatProvider::new("local", "http://localhost:9001/v1/", "not-needed", None)
            .unwrap()
    }

    #[test]
    fn constructor_trims_trailing_slash() {
        let provider = provider();
        assert_eq!(provider.name(), "local");
        assert_eq!(provider.base_url(), "http://localhost:9001/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("Jij bent een robot"), Message::user("Hoi")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
        assert_eq!(api_messages[1].content.as_deref(), Some("Hoi"));
    }

    #[test]
    fn streaming_request_body_shape() {
        let request = ProviderRequest {
            model: "local-model".into(),
            messages: vec![Message::system("s"), Message::user("u")],
            temperature: 0.5,
            stream: true,
        };
        let body = OpenAiCompatProvider::request_body(&request, true);
        assert_eq!(body["model"], "local-model");
        assert_eq!(body["stream"], true);
        assert!((body["temperature"].as_f64().unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "u");
    }

    // --- SSE parsing tests ---

    #[test]
    fn parse_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hallo"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(line), SseItem::Content("Hallo".into()));
    }

    #[test]
    fn parse_data_without_space() {
        let line = r#"data:{"choices":[{"delta":{"content":"x"}}]}"#;
        assert_eq!(parse_sse_line(line), SseItem::Content("x".into()));
    }

    #[test]
    fn parse_role_only_and_finish_chunks_are_skipped() {
        let role = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        let finish = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let empty = r#"data: {"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_sse_line(role), SseItem::Skip);
        assert_eq!(parse_sse_line(finish), SseItem::Skip);
        assert_eq!(parse_sse_line(empty), SseItem::Skip);
    }

    #[test]
    fn parse_done_marker() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseItem::Done);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        assert_eq!(parse_sse_line(""), SseItem::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseItem::Skip);
        assert_eq!(parse_sse_line("event: message"), SseItem::Skip);
    }

    #[test]
    fn garbage_data_is_an_error() {
        assert!(matches!(parse_sse_line("data: {not json"), SseItem::Error(_)));
    }

    #[test]
    fn error_object_mid_stream_is_an_error() {
        let line = r#"data: {"error":{"message":"context size exceeded","code":500}}"#;
        assert_eq!(
            parse_sse_line(line),
            SseItem::Error("context size exceeded".into())
        );
    }

    #[test]
    fn error_without_message_keeps_the_raw_value() {
        let text = r#"data: {"error":"overloaded"}"#;
        let object = r#"data: {"error":{"code":503}}"#;
        assert_eq!(parse_sse_line(text), SseItem::Error("overloaded".into()));
        assert_eq!(parse_sse_line(object), SseItem::Error(r#"{"code":503}"#.into()));
    }

    #[test]
    fn line_buffer_reassembles_split_lines() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: {\"choi").is_empty());
        let lines = buffer.push(b"ces\":[]}\r\n\r\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"choices\":[]}", "", "data: [DONE]"]);
    }

    #[test]
    fn line_buffer_keeps_multibyte_chars_intact() {
        let mut buffer = SseLineBuffer::default();
        let text = "data: café\n".as_bytes();
        // Split inside the two-byte 'é'
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(buffer.push(&text[..split]).is_empty());
        assert_eq!(buffer.push(&text[split..]), vec!["data: café"]);
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        // Port 9 (discard) is essentially never served on localhost
        let provider =
            OpenAiCompatProvider::new("local", "http://127.0.0.1:9/v1", "not-needed", None)
                .unwrap();
        let result = provider
            .stream(ProviderRequest {
                model: "local-model".into(),
                messages: vec![Message::user("hallo")],
                temperature: 0.5,
                    stream: true,
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Network(_))));
    }
}
