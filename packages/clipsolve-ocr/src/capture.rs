//! Screen capture of the primary monitor, whole or cropped to a region.
//!
//! A real backend is compiled in with the `screen-capture` feature; without it every
//! capture fails with [`OcrError::Unsupported`] and callers fall back to image files.
use image::DynamicImage;

use crate::engine::OcrError;

/// Screen rectangle in physical pixels of the primary monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub trait ScreenCapture: Send + Sync {
    /// The whole primary monitor.
    fn capture_full(&self) -> Result<DynamicImage, OcrError>;

    fn capture(&self, rect: ScreenRect) -> Result<DynamicImage, OcrError> {
        crop_to_rect(&self.capture_full()?, rect)
    }
}

/// Crops `rect` out of a full-screen image, rejecting rectangles that leave the screen.
pub fn crop_to_rect(screen: &DynamicImage, rect: ScreenRect) -> Result<DynamicImage, OcrError> {
    let right = rect.x.checked_add(rect.width);
    let bottom = rect.y.checked_add(rect.height);
    match (right, bottom) {
        (Some(r), Some(b)) if r <= screen.width() && b <= screen.height() => {
            Ok(screen.crop_imm(rect.x, rect.y, rect.width, rect.height))
        }
        _ => Err(OcrError::InvalidRegion(format!(
            "{}x{} at ({}, {}) exceeds screen {}x{}",
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            screen.width(),
            screen.height()
        ))),
    }
}

#[cfg(feature = "screen-capture")]
pub struct XcapCapture;

#[cfg(feature = "screen-capture")]
impl ScreenCapture for XcapCapture {
    fn capture_full(&self) -> Result<DynamicImage, OcrError> {
        let monitors = xcap::Monitor::all().map_err(|e| OcrError::EngineError(e.to_string()))?;
        let monitor = monitors
            .first()
            .ok_or_else(|| OcrError::EngineError("no monitors found".into()))?;
        let screen = monitor
            .capture_image()
            .map_err(|e| OcrError::EngineError(e.to_string()))?;
        Ok(DynamicImage::ImageRgba8(screen))
    }
}

pub struct UnsupportedCapture;

impl ScreenCapture for UnsupportedCapture {
    fn capture_full(&self) -> Result<DynamicImage, OcrError> {
        Err(OcrError::Unsupported(
            "screen capture not compiled in; rebuild with --features screen-capture".into(),
        ))
    }
}

/// The best capture backend available in this build.
pub fn default_capture() -> Box<dyn ScreenCapture> {
    #[cfg(feature = "screen-capture")]
    {
        Box::new(XcapCapture)
    }
    #[cfg(not(feature = "screen-capture"))]
    {
        Box::new(UnsupportedCapture)
    }
}
