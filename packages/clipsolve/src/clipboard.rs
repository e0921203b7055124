//! Clipboard access behind a trait so the monitor loop can be driven in tests.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read clipboard: {0}")]
    Read(String),
}

pub trait ClipboardSource: Send + Sync {
    /// Current text content, or `None` when the clipboard holds no text.
    fn read_text(&self) -> Result<Option<String>, ClipboardError>;
}

/// System clipboard through `arboard`. A handle is opened per read, so the source can
/// be shared across threads on every platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardSource for SystemClipboard {
    fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
        match clipboard.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(ClipboardError::Read(e.to_string())),
        }
    }
}
