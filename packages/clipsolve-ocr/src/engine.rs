use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::region::TextRegion;

#[derive(Debug, Clone)]
pub enum OcrInput {
    FilePath(PathBuf),
    /// Encoded image bytes (PNG, JPEG, BMP).
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub text: String,
    pub regions: Vec<TextRegion>,
}

impl OcrOutput {
    /// Joins region texts line by line, skipping regions that hold only whitespace.
    pub fn from_regions(regions: Vec<TextRegion>) -> Self {
        let text = regions
            .iter()
            .map(|r| r.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Self { text, regions }
    }
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("image contains no pixel data")]
    EmptyImage,
    #[error("no text detected in image")]
    NoText,
    #[error("invalid region: {0}")]
    InvalidRegion(String),
    #[error("engine error: {0}")]
    EngineError(String),
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, input: &OcrInput) -> Result<OcrOutput, OcrError>;
}
