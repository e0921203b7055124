//! Shared fixtures: an in-process chat-completions provider and fakes for the controller.
#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};

use clipsolve::clipboard::{ClipboardError, ClipboardSource};
use clipsolve::{LlmClient, LlmOptions};

/// One SSE event carrying a content delta.
pub fn sse_chunk(content: &str) -> String {
    let payload = serde_json::json!({ "choices": [{ "delta": { "content": content } }] });
    format!("data: {payload}\n\n")
}

/// A complete SSE body for `chunks`, terminated by `[DONE]`.
pub fn sse_body(chunks: &[&str]) -> String {
    let mut body: String = chunks.iter().map(|c| sse_chunk(c)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1")
}

/// Provider answering every request with `status` and `body`. Returns the API base URL.
pub async fn provider(status: StatusCode, body: impl Into<String>) -> String {
    let body = body.into();
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let body = body.clone();
            async move {
                Response::builder()
                    .status(status)
                    .header(header::CONTENT_TYPE, "text/event-stream")
                    .body(Body::from(body))
                    .unwrap()
            }
        }),
    );
    spawn(app).await
}

/// Provider that sends one chunk every `delay`, so a query stays in flight for a while.
pub async fn slow_provider(chunks: Vec<&'static str>, delay: Duration) -> String {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let chunks = chunks.clone();
            async move {
                let stream = async_stream::stream! {
                    for chunk in chunks {
                        tokio::time::sleep(delay).await;
                        yield Ok::<_, Infallible>(sse_chunk(chunk));
                    }
                    yield Ok("data: [DONE]\n\n".to_string());
                };
                Response::builder()
                    .header(header::CONTENT_TYPE, "text/event-stream")
                    .body(Body::from_stream(stream))
                    .unwrap()
            }
        }),
    );
    spawn(app).await
}

/// A base URL nothing listens on.
pub async fn closed_base() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1")
}

pub fn client(api_base: &str) -> LlmClient {
    LlmClient::new(LlmOptions {
        api_base: api_base.to_string(),
        api_key: Some("test-key".to_string()),
        request_timeout: Duration::from_secs(10),
        ..LlmOptions::default()
    })
    .unwrap()
}

/// Provider that records the user prompt of every request and answers with `answer`.
pub async fn recording_provider(answer: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&prompts);
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move |Json(body): Json<serde_json::Value>| {
            let seen = Arc::clone(&seen);
            async move {
                let prompt = body["messages"][1]["content"].as_str().unwrap_or_default().to_string();
                seen.lock().unwrap().push(prompt);
                Response::builder()
                    .header(header::CONTENT_TYPE, "text/event-stream")
                    .body(Body::from(sse_body(&[answer])))
                    .unwrap()
            }
        }),
    );
    (spawn(app).await, prompts)
}

/// Clipboard whose content the test sets directly. Counts how often it is read.
#[derive(Default, Clone)]
pub struct FakeClipboard {
    content: Arc<Mutex<Option<String>>>,
    reads: Arc<AtomicUsize>,
}

impl FakeClipboard {
    pub fn set(&self, text: &str) {
        *self.content.lock().unwrap() = Some(text.to_string());
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset_reads(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }
}

impl ClipboardSource for FakeClipboard {
    fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.content.lock().unwrap().clone())
    }
}
