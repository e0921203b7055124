//! Streaming client for an OpenAI-compatible chat completions API.
//!
//! [`LlmClient::query_stream`] validates its input before touching the network and
//! returns a lazy stream of text chunks. Transport and provider failures surface as
//! [`LlmError`] items whose [`LlmError::user_message`] is safe to show in the UI.

use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::model::{ModelSelection, PromptMode};
use crate::text::{self, DETAIL_CAP};
use crate::validation::validate_text;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Lazy, finite sequence of response chunks. Consumed once; not restartable.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    #[error("Invalid prompt provided. Please provide meaningful input.")]
    InvalidPrompt,
    #[error("Model client not initialized. Check the API key configuration.")]
    NotConfigured,
    #[error("Connection Error: Could not reach the model API. {0}")]
    Connection(String),
    #[error("Rate limit exceeded. Please wait a moment and try again.")]
    RateLimit,
    #[error("Invalid API key. Please check your configuration.")]
    Auth,
    #[error("API Error (Status {code}): {message}")]
    Status { code: u16, message: String },
    #[error("Unexpected error: {kind}: {message}")]
    Generic { kind: String, message: String },
    #[error("(No response from API)")]
    NoContent,
}

impl LlmError {
    /// Message for the status line and response pane, capped at [`text::MESSAGE_CAP`].
    pub fn user_message(&self) -> String {
        match self {
            LlmError::NoContent => text::user_message(&self.to_string()),
            _ => text::user_message(&format!("Error: {self}")),
        }
    }

    fn generic(kind: &str, message: impl AsRef<str>) -> Self {
        LlmError::Generic {
            kind: kind.to_string(),
            message: text::detail(message.as_ref()),
        }
    }
}

/// Connection settings for [`LlmClient`].
#[derive(Debug, Clone)]
pub struct LlmOptions {
    pub api_base: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            max_tokens: 1000,
            temperature: 0.6,
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// One event decoded from a `text/event-stream` body.
#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental decoder for server-sent events. Handles lines and UTF-8 sequences
/// split across network chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Decodes whatever is left once the body has ended without a trailing newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }
}

fn decode_line(line: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        Some(SseEvent::Done)
    } else if data.is_empty() {
        None
    } else {
        Some(SseEvent::Data(data.to_string()))
    }
}

enum Step {
    Chunk(String),
    Skip,
    Done,
    Fail(LlmError),
}

fn interpret(event: SseEvent) -> Step {
    let data = match event {
        SseEvent::Done => return Step::Done,
        SseEvent::Data(data) => data,
    };
    let chunk: ChatChunk = match serde_json::from_str(&data) {
        Ok(chunk) => chunk,
        Err(e) => return Step::Fail(LlmError::generic("InvalidChunk", e.to_string())),
    };
    if let Some(err) = chunk.error {
        let kind = err.kind.unwrap_or_else(|| "ProviderError".to_string());
        return Step::Fail(LlmError::generic(&kind, err.message));
    }
    match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
        Some(content) if !content.is_empty() => Step::Chunk(content),
        _ => Step::Skip,
    }
}

fn classify_transport(err: &reqwest::Error) -> LlmError {
    if err.is_connect() || err.is_timeout() {
        LlmError::Connection(text::detail(&err.to_string()))
    } else if err.is_decode() || err.is_body() {
        LlmError::generic("BodyError", err.to_string())
    } else {
        LlmError::generic("RequestError", err.to_string())
    }
}

fn classify_status(code: u16, body: &str) -> LlmError {
    match code {
        429 => LlmError::RateLimit,
        401 | 403 => LlmError::Auth,
        _ => {
            let message = serde_json::from_str::<ApiErrorEnvelope>(body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.to_string());
            LlmError::Status {
                code,
                message: text::detail(&message),
            }
        }
    }
}

/// Client for the hosted model. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    options: LlmOptions,
    prompt_mode: PromptMode,
}

impl LlmClient {
    pub fn new(options: LlmOptions) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| LlmError::generic("ClientBuildError", e.to_string()))?;

        if options.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            error!("API key not found; set OPENAI_API_KEY or api_key in the config file");
        }

        Ok(Self {
            http,
            options,
            prompt_mode: PromptMode::default(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    fn api_key(&self) -> Option<&str> {
        self.options
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn update_api_key(&mut self, key: impl Into<String>) {
        self.options.api_key = Some(key.into());
        info!("API key updated");
    }

    pub fn prompt_mode(&self) -> PromptMode {
        self.prompt_mode
    }

    pub fn set_prompt_mode(&mut self, mode: PromptMode) {
        self.prompt_mode = mode;
        info!(%mode, "prompt mode set");
    }

    /// Starts a streaming completion for `prompt`.
    ///
    /// Returns `Err` without any network traffic if the prompt is not valid text or no
    /// API key is configured. The request itself is sent when the stream is first polled.
    /// A stream that produces no content ends with [`LlmError::NoContent`].
    pub fn query_stream(&self, prompt: &str, model: ModelSelection) -> Result<ChunkStream, LlmError> {
        if !validate_text(Some(prompt)) {
            return Err(LlmError::InvalidPrompt);
        }
        let api_key = self.api_key().ok_or(LlmError::NotConfigured)?.to_string();

        let url = format!("{}/chat/completions", self.options.api_base.trim_end_matches('/'));
        let body = serde_json::to_value(ChatRequest {
            model: model.as_str(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.prompt_mode.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            stream: true,
        })
        .map_err(|e| LlmError::generic("SerializeError", e.to_string()))?;

        let request = self.http.post(url).bearer_auth(api_key).json(&body);
        info!(%model, mode = %self.prompt_mode, "sending streaming query");

        let stream = async_stream::stream! {
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let err = classify_transport(&e);
                    error!(error = %e, "model request failed");
                    yield Err(err);
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let err = classify_status(status.as_u16(), &body);
                error!(status = status.as_u16(), "model API returned an error status");
                yield Err(err);
                return;
            }

            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut chunk_count = 0usize;
            let mut finished = false;

            while let Some(item) = body.next().await {
                let bytes = match item {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!(error = %e, "model stream interrupted");
                        yield Err(classify_transport(&e));
                        return;
                    }
                };
                for event in decoder.push(&bytes) {
                    match interpret(event) {
                        Step::Chunk(content) => {
                            chunk_count += 1;
                            yield Ok(content);
                        }
                        Step::Skip => {}
                        Step::Done => {
                            finished = true;
                            break;
                        }
                        Step::Fail(err) => {
                            error!(error = %err, "model stream reported an error");
                            yield Err(err);
                            return;
                        }
                    }
                }
                if finished {
                    break;
                }
            }

            if !finished {
                if let Some(event) = decoder.finish() {
                    match interpret(event) {
                        Step::Chunk(content) => {
                            chunk_count += 1;
                            yield Ok(content);
                        }
                        Step::Fail(err) => {
                            yield Err(err);
                            return;
                        }
                        Step::Skip | Step::Done => {}
                    }
                }
            }

            if chunk_count == 0 {
                warn!("model stream returned no content chunks");
                yield Err(LlmError::NoContent);
            } else {
                debug!(chunk_count, "model stream complete");
            }
        };

        Ok(Box::pin(stream))
    }

    /// Non-streaming convenience: drains [`Self::query_stream`] into one string.
    pub async fn query(&self, prompt: &str, model: ModelSelection) -> Result<String, LlmError> {
        let mut stream = self.query_stream(prompt, model)?;
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            output.push_str(&chunk?);
        }
        Ok(output.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::MESSAGE_CAP;

    #[test]
    fn test_decoder_splits_events() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: {\"a\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(
            events,
            vec![SseEvent::Data("{\"a\":1}".into()), SseEvent::Done]
        );
    }

    #[test]
    fn test_decoder_handles_partial_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"content\":").is_empty());
        let events = decoder.push(b"\"x\"}\r\n: keep-alive\n");
        assert_eq!(events, vec![SseEvent::Data("{\"content\":\"x\"}".into())]);
    }

    #[test]
    fn test_decoder_handles_split_utf8() {
        let mut decoder = SseDecoder::default();
        let line = "data: héllo\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(decoder.push(&line[..split]).is_empty());
        assert_eq!(decoder.push(&line[split..]), vec![SseEvent::Data("héllo".into())]);
    }

    #[test]
    fn test_decoder_finish_flushes_tail() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some(SseEvent::Data("tail".into())));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_interpret_chunks() {
        let event = SseEvent::Data(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#.into());
        assert!(matches!(interpret(event), Step::Chunk(c) if c == "Hi"));

        let role_only = SseEvent::Data(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#.into());
        assert!(matches!(interpret(role_only), Step::Skip));

        let no_choices = SseEvent::Data(r#"{"choices":[]}"#.into());
        assert!(matches!(interpret(no_choices), Step::Skip));

        let garbage = SseEvent::Data("not json".into());
        assert!(matches!(
            interpret(garbage),
            Step::Fail(LlmError::Generic { ref kind, .. }) if kind == "InvalidChunk"
        ));
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(429, ""), LlmError::RateLimit);
        assert_eq!(classify_status(401, ""), LlmError::Auth);
        let body = r#"{"error":{"message":"The server had an error","type":"server_error"}}"#;
        assert_eq!(
            classify_status(500, body),
            LlmError::Status {
                code: 500,
                message: "The server had an error".into()
            }
        );
        let long = "z".repeat(300);
        match classify_status(502, &long) {
            LlmError::Status { message, .. } => assert_eq!(message.chars().count(), DETAIL_CAP),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_user_messages_are_capped() {
        let long = "y".repeat(400);
        let errors = [
            LlmError::InvalidPrompt,
            LlmError::NotConfigured,
            LlmError::Connection(long.clone()),
            LlmError::RateLimit,
            LlmError::Auth,
            LlmError::Status { code: 500, message: long.clone() },
            LlmError::Generic { kind: "Weird".into(), message: long.clone() },
            LlmError::NoContent,
        ];
        for err in errors {
            let msg = err.user_message();
            assert!(msg.chars().count() <= MESSAGE_CAP, "{msg}");
            assert!(!msg.is_empty());
        }
        assert_eq!(LlmError::NoContent.user_message(), "(No response from API)");
        assert!(LlmError::RateLimit.user_message().contains("try again"));
        assert!(LlmError::Auth.user_message().contains("configuration"));
    }

    #[test]
    fn test_query_stream_fails_fast() {
        let client = LlmClient::new(LlmOptions {
            api_key: Some("test-key".into()),
            api_base: "http://127.0.0.1:1".into(),
            ..LlmOptions::default()
        })
        .unwrap();
        assert_eq!(
            client.query_stream(" a ", ModelSelection::Gpt4oMini).err(),
            Some(LlmError::InvalidPrompt)
        );

        let unconfigured = LlmClient::new(LlmOptions::default()).unwrap();
        assert!(!unconfigured.is_configured());
        assert_eq!(
            unconfigured.query_stream("hello", ModelSelection::Gpt4oMini).err(),
            Some(LlmError::NotConfigured)
        );
    }
}
