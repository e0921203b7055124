//! State shared between the controller (single writer) and the companion server.
use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub const NO_RESPONSE: &str = "No response yet.";

/// Number of finalized responses kept for paging back.
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub model: String,
    pub finished_at: String,
    pub response: String,
}

#[derive(Debug)]
struct Inner {
    latest: String,
    history: VecDeque<HistoryEntry>,
}

/// Latest response text and recent history. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct SharedResponse {
    inner: Arc<RwLock<Inner>>,
}

impl Default for SharedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedResponse {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                latest: NO_RESPONSE.to_string(),
                history: VecDeque::new(),
            })),
        }
    }

    pub async fn latest(&self) -> String {
        self.inner.read().await.latest.clone()
    }

    pub async fn update(&self, text: impl Into<String>) {
        self.inner.write().await.latest = text.into();
    }

    /// Moves the current response into history, dropping the oldest entry past the limit.
    pub async fn finalize(&self, model: &str) {
        let mut inner = self.inner.write().await;
        if inner.latest == NO_RESPONSE || inner.latest.trim().is_empty() {
            return;
        }
        let entry = HistoryEntry {
            model: model.to_string(),
            finished_at: chrono::Utc::now().to_rfc3339(),
            response: inner.latest.clone(),
        };
        inner.history.push_back(entry);
        while inner.history.len() > HISTORY_LIMIT {
            inner.history.pop_front();
        }
    }

    /// History, oldest first.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.inner.read().await.history.iter().cloned().collect()
    }
}
