//! # clipsolve
//!
//! A desktop helper that watches the clipboard (or a screen region through OCR), sends
//! captured text to a hosted chat model and streams the answer to the terminal and to a
//! companion device polling a small local web server.
//!
//! ## Features
//!
//! - **Input validation**: Captured text and screen regions are checked before any query
//! - **Streaming model client**: Lazy chunk stream with classified, length-capped errors
//! - **Controller**: Clipboard monitor with debounce and at most one in-flight query
//! - **Companion server**: `GET /response` for a phone or second screen
//! - **OCR**: Tesseract-backed recognition of image files and screen regions
//!
//! ## Quick Start
//!
//! ```ignore
//! use clipsolve::prelude::*;
//! use futures::StreamExt;
//!
//! assert!(validate_text(Some("ab")));
//! assert!(validate_region(&[0, 0, 5, 5]));
//!
//! let client = LlmClient::new(LlmOptions {
//!     api_key: std::env::var("OPENAI_API_KEY").ok(),
//!     ..LlmOptions::default()
//! })?;
//! let mut stream = client.query_stream("Reverse a linked list in Rust", ModelSelection::Gpt4oMini)?;
//! while let Some(chunk) = stream.next().await {
//!     print!("{}", chunk?);
//! }
//! ```

pub mod cli;
pub mod clipboard;
pub mod config;
pub mod console;
pub mod controller;
pub mod llm;
pub mod logging;
pub mod model;
pub mod notifier;
pub mod result;
pub mod server;
pub mod state;
pub mod text;
pub mod validation;

// Re-export commonly used types at the root level
pub use clipboard::{ClipboardError, ClipboardSource, SystemClipboard};
pub use config::{ConfigError, Settings};
pub use controller::{Controller, ControllerDeps, ControllerError, ControllerOptions, ControllerState, Indicator, UiEvent};
pub use llm::{ChunkStream, LlmClient, LlmError, LlmOptions};
pub use model::{ModelSelection, PromptMode};
pub use notifier::{send_test_message, send_test_message_with_timeout, NotifyError};
pub use result::{QueryResult, QueryState};
pub use server::{CompanionServer, ServerError};
pub use state::SharedResponse;
pub use validation::{validate_port, validate_region, validate_text, Region, ValidationError};

/// Prelude module for convenient imports
///
/// Import everything you need with:
/// ```ignore
/// use clipsolve::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        validate_port, validate_region, validate_text, ClipboardSource, CompanionServer, Controller,
        ControllerDeps, ControllerOptions, ControllerState, LlmClient, LlmError, LlmOptions,
        ModelSelection, PromptMode, QueryResult, QueryState, Region, Settings, SharedResponse, UiEvent,
    };
}
