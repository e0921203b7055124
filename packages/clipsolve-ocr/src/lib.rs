pub mod adapter;
pub mod capture;
pub mod engine;
pub mod region;
pub mod tesseract;

pub use adapter::{decode_image, load_image, perform_ocr, validate_image};
pub use capture::{default_capture, ScreenCapture, ScreenRect, UnsupportedCapture};
pub use engine::{OcrEngine, OcrError, OcrInput, OcrOutput};
pub use region::{BoundingBox, TextRegion};
pub use tesseract::TesseractEngine;

#[cfg(feature = "screen-capture")]
pub use capture::XcapCapture;

pub use image::DynamicImage;
