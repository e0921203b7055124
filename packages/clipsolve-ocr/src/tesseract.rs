use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::engine::{OcrEngine, OcrError, OcrInput, OcrOutput};
use crate::region::{BoundingBox, TextRegion};

/// Word rows in tesseract's TSV output carry this level.
const WORD_LEVEL: &str = "5";

/// OCR engine backed by the `tesseract` command line tool.
pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self::with_options("tesseract", "eng")
    }

    pub fn with_options(binary: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }

    async fn run(&self, source: &str, stdin_data: Option<&[u8]>) -> Result<String, OcrError> {
        let mut child = Command::new(&self.binary)
            .args([source, "stdout", "-l", &self.language, "tsv"])
            .stdin(if stdin_data.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => OcrError::Unsupported(format!(
                    "tesseract executable not found at {}",
                    self.binary.display()
                )),
                _ => OcrError::EngineError(e.to_string()),
            })?;

        if let (Some(data), Some(mut stdin)) = (stdin_data, child.stdin.take()) {
            stdin
                .write_all(data)
                .await
                .map_err(|e| OcrError::EngineError(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OcrError::EngineError(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::EngineError(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, input: &OcrInput) -> Result<OcrOutput, OcrError> {
        let tsv = match input {
            OcrInput::FilePath(path) => {
                let path = path
                    .to_str()
                    .ok_or_else(|| OcrError::InvalidImage("non-utf8 path".into()))?;
                self.run(path, None).await?
            }
            OcrInput::Bytes(data) => {
                if data.is_empty() {
                    return Err(OcrError::EmptyImage);
                }
                self.run("stdin", Some(data)).await?
            }
        };
        let regions = parse_tsv(&tsv);
        debug!(regions = regions.len(), "tesseract finished");
        Ok(OcrOutput::from_regions(regions))
    }
}

struct LineBuilder {
    key: (String, String, String, String),
    words: Vec<String>,
    bbox: Option<BoundingBox>,
    confidence_sum: f32,
    confidence_count: u32,
}

impl LineBuilder {
    fn finish(self) -> TextRegion {
        let confidence = (self.confidence_count > 0)
            .then(|| self.confidence_sum / self.confidence_count as f32 / 100.0);
        TextRegion {
            text: self.words.join(" "),
            bounding_box: self.bbox,
            confidence,
        }
    }
}

fn field<'a>(fields: &[&'a str], index: usize) -> Option<&'a str> {
    fields.get(index).map(|f| f.trim())
}

fn parse_f32(fields: &[&str], index: usize) -> Option<f32> {
    field(fields, index).and_then(|f| f.parse().ok())
}

/// Groups word rows of tesseract TSV output into one region per text line.
///
/// Malformed or short rows are skipped rather than rejected.
pub fn parse_tsv(tsv: &str) -> Vec<TextRegion> {
    let mut regions = Vec::new();
    let mut current: Option<LineBuilder> = None;

    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if field(&fields, 0) != Some(WORD_LEVEL) {
            continue;
        }
        let Some(text) = field(&fields, 11).filter(|t| !t.is_empty()) else {
            continue;
        };
        let (Some(page), Some(block), Some(par), Some(line)) = (
            field(&fields, 1),
            field(&fields, 2),
            field(&fields, 3),
            field(&fields, 4),
        ) else {
            continue;
        };
        let key = (page.to_string(), block.to_string(), par.to_string(), line.to_string());

        let bbox = match (
            parse_f32(&fields, 6),
            parse_f32(&fields, 7),
            parse_f32(&fields, 8),
            parse_f32(&fields, 9),
        ) {
            (Some(x), Some(y), Some(width), Some(height)) => Some(BoundingBox { x, y, width, height }),
            _ => None,
        };
        let confidence = parse_f32(&fields, 10).filter(|c| *c >= 0.0);

        if current.as_ref().map(|c| &c.key) != Some(&key) {
            if let Some(done) = current.take() {
                regions.push(done.finish());
            }
            current = Some(LineBuilder {
                key,
                words: Vec::new(),
                bbox: None,
                confidence_sum: 0.0,
                confidence_count: 0,
            });
        }

        if let Some(builder) = current.as_mut() {
            builder.words.push(text.to_string());
            builder.bbox = match (builder.bbox.take(), bbox) {
                (Some(acc), Some(b)) => Some(acc.union(&b)),
                (acc, b) => acc.or(b),
            };
            if let Some(c) = confidence {
                builder.confidence_sum += c;
                builder.confidence_count += 1;
            }
        }
    }

    if let Some(done) = current.take() {
        regions.push(done.finish());
    }
    regions
}
