//! Predicates that gate captured input before anything is sent to the model.
use thiserror::Error;
use tracing::warn;

use clipsolve_ocr::ScreenRect;

/// Minimum width and height of a selectable screen region, in pixels.
pub const MIN_REGION_SIZE: i64 = 5;

/// Minimum number of characters left after trimming for text to be worth a query.
pub const MIN_TEXT_CHARS: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Input is empty or too short to query.")]
    InvalidText,
    #[error("Invalid region: {0}")]
    InvalidRegion(String),
    #[error("Port {0} is outside 0-65535.")]
    InvalidPort(i64),
    #[error("Unknown model '{0}'.")]
    UnknownModel(String),
}

/// True iff `text` is present and has at least two characters once trimmed.
pub fn validate_text(text: Option<&str>) -> bool {
    match text {
        Some(text) => text.trim().chars().count() >= MIN_TEXT_CHARS,
        None => false,
    }
}

/// True iff `values` is `[x, y, width, height]`, all non-negative, with width and
/// height of at least [`MIN_REGION_SIZE`]. Invalid regions are logged, not raised.
pub fn validate_region(values: &[i64]) -> bool {
    let [x, y, width, height] = values else {
        warn!(len = values.len(), "region must have exactly four values");
        return false;
    };
    if [x, y, width, height].iter().any(|v| **v < 0) {
        warn!(?values, "region has negative values");
        return false;
    }
    if *width < MIN_REGION_SIZE || *height < MIN_REGION_SIZE {
        warn!(width, height, "region is smaller than {MIN_REGION_SIZE}x{MIN_REGION_SIZE}");
        return false;
    }
    if [x, y, width, height].iter().any(|v| **v > u32::MAX as i64) {
        warn!(?values, "region exceeds screen coordinate range");
        return false;
    }
    true
}

/// Validated screen region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn from_values(values: &[i64]) -> Option<Region> {
        if !validate_region(values) {
            return None;
        }
        match values {
            [x, y, width, height] => Some(Region {
                x: u32::try_from(*x).ok()?,
                y: u32::try_from(*y).ok()?,
                width: u32::try_from(*width).ok()?,
                height: u32::try_from(*height).ok()?,
            }),
            _ => None,
        }
    }
}

impl TryFrom<&[i64]> for Region {
    type Error = ValidationError;

    fn try_from(values: &[i64]) -> Result<Self, Self::Error> {
        Region::from_values(values).ok_or_else(|| ValidationError::InvalidRegion(format!("{values:?}")))
    }
}

impl From<Region> for ScreenRect {
    fn from(region: Region) -> Self {
        ScreenRect {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
        }
    }
}

/// Accepts ports in `0..=65535`; port 0 asks the OS for an ephemeral port.
pub fn validate_port(port: i64) -> Result<u16, ValidationError> {
    u16::try_from(port).map_err(|_| ValidationError::InvalidPort(port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_text() {
        assert!(!validate_text(None));
        assert!(!validate_text(Some("")));
        assert!(!validate_text(Some("   ")));
        assert!(!validate_text(Some("a")));
        assert!(!validate_text(Some("  a \n")));
        assert!(validate_text(Some("ab")));
        assert!(validate_text(Some("Hello world")));
    }

    #[test]
    fn test_validate_text_counts_characters_not_bytes() {
        assert!(!validate_text(Some("é")));
        assert!(validate_text(Some("日本")));
    }

    #[test]
    fn test_validate_region() {
        assert!(validate_region(&[0, 0, 5, 5]));
        assert!(validate_region(&[10, 20, 100, 100]));
        assert!(!validate_region(&[0, 0, 3, 3]));
        assert!(!validate_region(&[0, 0, 5, 4]));
        assert!(!validate_region(&[-1, 0, 10, 10]));
        assert!(!validate_region(&[0, -1, 10, 10]));
        assert!(!validate_region(&[0, 0, 10]));
        assert!(!validate_region(&[0, 0, 10, 10, 10]));
        assert!(!validate_region(&[]));
    }

    #[test]
    fn test_region_conversion() {
        let region = Region::from_values(&[1, 2, 30, 40]).unwrap();
        assert_eq!(region, Region { x: 1, y: 2, width: 30, height: 40 });
        let rect: ScreenRect = region.into();
        assert_eq!(rect.width, 30);

        assert!(Region::from_values(&[0, 0, 3, 3]).is_none());
        assert!(matches!(
            Region::try_from(&[0_i64, 0, 10][..]),
            Err(ValidationError::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_validate_port() {
        assert_eq!(validate_port(0), Ok(0));
        assert_eq!(validate_port(5000), Ok(5000));
        assert_eq!(validate_port(65535), Ok(65535));
        assert_eq!(validate_port(-1), Err(ValidationError::InvalidPort(-1)));
        assert_eq!(validate_port(65536), Err(ValidationError::InvalidPort(65536)));
    }
}
