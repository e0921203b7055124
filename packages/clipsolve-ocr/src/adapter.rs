//! Validation around the OCR engine: images are checked before recognition and the
//! recognised text is checked after it.
use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

use crate::engine::{OcrEngine, OcrError, OcrInput};

/// Returns true when `image` is present, uses a pixel layout the engines accept and has
/// non-zero dimensions. Failures are logged, never raised.
pub fn validate_image(image: Option<&DynamicImage>) -> bool {
    let Some(image) = image else {
        warn!("image is missing");
        return false;
    };

    let supported = matches!(
        image,
        DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
            | DynamicImage::ImageRgb16(_)
            | DynamicImage::ImageRgba16(_)
    );
    if !supported {
        warn!(color = ?image.color(), "unsupported image type");
        return false;
    }

    if image.width() == 0 || image.height() == 0 {
        warn!(width = image.width(), height = image.height(), "image has zero dimensions");
        return false;
    }

    true
}

/// Decodes encoded image bytes, rejecting anything the `image` crate cannot identify.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, OcrError> {
    if bytes.is_empty() {
        return Err(OcrError::EmptyImage);
    }
    image::load_from_memory(bytes).map_err(|e| OcrError::InvalidImage(e.to_string()))
}

pub fn load_image(path: &Path) -> Result<DynamicImage, OcrError> {
    image::open(path).map_err(|e| OcrError::InvalidImage(format!("{}: {e}", path.display())))
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.to_rgba8())
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| OcrError::InvalidImage(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Runs `engine` over `image` and returns the recognised text.
///
/// Fails with [`OcrError::InvalidImage`] if the image does not pass [`validate_image`],
/// [`OcrError::EmptyImage`] if its pixel buffer is empty and [`OcrError::NoText`] if the
/// engine detects no text regions.
pub async fn perform_ocr(
    engine: &dyn OcrEngine,
    image: Option<&DynamicImage>,
) -> Result<String, OcrError> {
    if !validate_image(image) {
        return Err(OcrError::InvalidImage("image failed validation".into()));
    }
    let image = image.ok_or_else(|| OcrError::InvalidImage("image is missing".into()))?;
    if image.as_bytes().is_empty() {
        return Err(OcrError::EmptyImage);
    }

    let png = encode_png(image)?;
    let output = engine.recognize(&OcrInput::Bytes(png)).await?;
    if output.regions.is_empty() {
        return Err(OcrError::NoText);
    }

    let lines: Vec<&str> = output
        .regions
        .iter()
        .map(|region| region.text.trim())
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return Err(OcrError::NoText);
    }

    debug!(regions = output.regions.len(), "ocr extracted text");
    Ok(lines.join("\n"))
}
