use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::ModelSelection;
use crate::text;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum QueryState {
    Streaming,
    Complete,
    Errored(String),
}

/// Chunks received for one query, in arrival order, plus how the query ended.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub model: ModelSelection,
    pub started_at: DateTime<Utc>,
    chunks: Vec<String>,
    state: QueryState,
}

impl QueryResult {
    pub fn new(model: ModelSelection) -> Self {
        Self {
            model,
            started_at: Utc::now(),
            chunks: Vec::new(),
            state: QueryState::Streaming,
        }
    }

    /// Appends a chunk. Ignored once the result has reached a terminal state.
    pub fn push(&mut self, chunk: impl Into<String>) {
        if self.state == QueryState::Streaming {
            self.chunks.push(chunk.into());
        }
    }

    pub fn complete(&mut self) {
        if self.state == QueryState::Streaming {
            self.state = QueryState::Complete;
        }
    }

    /// Marks the result as failed; the message is capped like every user-facing message.
    pub fn fail(&mut self, message: &str) {
        if self.state == QueryState::Streaming {
            self.state = QueryState::Errored(text::user_message(message));
        }
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn is_finished(&self) -> bool {
        self.state != QueryState::Streaming
    }

    /// Text to display: the streamed content, followed by the error if there is one.
    pub fn text(&self) -> String {
        let content = self.chunks.concat();
        match &self.state {
            QueryState::Errored(message) if content.is_empty() => message.clone(),
            QueryState::Errored(message) => format!("{content}\n\n{message}"),
            _ => content,
        }
    }
}
