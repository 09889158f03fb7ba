//! Face boxes, crop requests and crop rectangles.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Bounding box in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    /// Box width
    pub width: f64,
    /// Box height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center x-coordinate.
    #[inline]
    pub fn cx(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Center y-coordinate.
    #[inline]
    pub fn cy(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    /// Box area in pixels.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Default padding factor for the live selfie crop.
pub const SELFIE_PADDING_FACTOR: f64 = 0.25;

/// ID-photo target width: 35 mm at 300 DPI.
pub const ID_PHOTO_WIDTH: u32 = 413;

/// ID-photo target height: 45 mm at 300 DPI.
pub const ID_PHOTO_HEIGHT: u32 = 531;

/// How the crop rectangle is derived from the face box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CropMode {
    /// Pad the face box proportionally to its width (selfie capture).
    ProportionalPadding {
        /// Padding as a fraction of face width
        factor: f64,
    },
    /// Fixed-pixel frame anchored just below the face (ID document).
    FixedIdFormat {
        target_width: u32,
        target_height: u32,
        /// Clamp a negative top edge to zero instead of rejecting the crop
        #[serde(default)]
        clamp_origin: bool,
    },
}

impl CropMode {
    /// Selfie crop with the default padding factor.
    pub fn selfie() -> Self {
        CropMode::ProportionalPadding {
            factor: SELFIE_PADDING_FACTOR,
        }
    }

    /// 35x45 mm ID-photo crop at 300 DPI.
    pub fn id_photo(clamp_origin: bool) -> Self {
        CropMode::FixedIdFormat {
            target_width: ID_PHOTO_WIDTH,
            target_height: ID_PHOTO_HEIGHT,
            clamp_origin,
        }
    }

    /// Short name for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            CropMode::ProportionalPadding { .. } => "proportional_padding",
            CropMode::FixedIdFormat { .. } => "fixed_id_format",
        }
    }
}

/// Input of a crop computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CropRequest {
    pub source_width: u32,
    pub source_height: u32,
    pub face_box: BoundingBox,
    pub mode: CropMode,
}

impl CropRequest {
    /// Create a new crop request.
    pub fn new(source_width: u32, source_height: u32, face_box: BoundingBox, mode: CropMode) -> Self {
        Self {
            source_width,
            source_height,
            face_box,
            mode,
        }
    }
}

/// Slack allowed when comparing a rectangle's far edge to the source edge.
const EDGE_TOLERANCE: f64 = 1e-6;

/// Crop rectangle inside the source image.
///
/// Values are kept fractional as produced by the geometry; use
/// [`CropResult::to_pixels`] to address actual pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CropResult {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropResult {
    /// Create a new crop rectangle.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle lies entirely inside a `source_width` x `source_height` image.
    ///
    /// Far edges may overshoot by float rounding only.
    pub fn fits_within(&self, source_width: u32, source_height: u32) -> bool {
        let values = [self.x, self.y, self.width, self.height];
        values.iter().all(|v| v.is_finite())
            && self.x >= 0.0
            && self.y >= 0.0
            && self.width >= 0.0
            && self.height >= 0.0
            && self.x + self.width <= source_width as f64 + EDGE_TOLERANCE
            && self.y + self.height <= source_height as f64 + EDGE_TOLERANCE
    }

    /// Whole-pixel region covering this rectangle, clamped to the source.
    ///
    /// The origin is floored and the far edge ceiled so no covered pixel is lost.
    pub fn to_pixels(&self, source_width: u32, source_height: u32) -> PixelRect {
        let x0 = (self.x.max(0.0).floor() as u32).min(source_width);
        let y0 = (self.y.max(0.0).floor() as u32).min(source_height);
        let x1 = ((self.x + self.width).max(0.0).ceil() as u32).min(source_width);
        let y1 = ((self.y + self.height).max(0.0).ceil() as u32).min(source_height);
        PixelRect {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
    }
}

/// Integer crop region within the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Whether the region contains no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_helpers() {
        let b = BoundingBox::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(b.cx(), 60.0);
        assert_eq!(b.cy(), 45.0);
        assert_eq!(b.x2(), 110.0);
        assert_eq!(b.y2(), 70.0);
        assert_eq!(b.area(), 5000.0);
    }

    #[test]
    fn test_fits_within() {
        assert!(CropResult::new(0.0, 0.0, 640.0, 480.0).fits_within(640, 480));
        assert!(!CropResult::new(0.0, -1.0, 10.0, 10.0).fits_within(640, 480));
        assert!(!CropResult::new(600.0, 0.0, 41.0, 10.0).fits_within(640, 480));
        assert!(!CropResult::new(f64::NAN, 0.0, 1.0, 1.0).fits_within(640, 480));
    }

    #[test]
    fn test_to_pixels_covers_fractional_edges() {
        let px = CropResult::new(25.0, 1.25, 150.0, 196.25).to_pixels(640, 480);
        assert_eq!(px, PixelRect { x: 25, y: 1, width: 150, height: 197 });
    }

    #[test]
    fn test_to_pixels_clamps() {
        let px = CropResult::new(600.0, 470.0, 100.0, 100.0).to_pixels(640, 480);
        assert_eq!(px.width, 40);
        assert_eq!(px.height, 10);
        assert!(!px.is_empty());
    }

    #[test]
    fn test_crop_mode_serde() {
        let mode: CropMode =
            serde_json::from_str(r#"{"mode":"fixed_id_format","target_width":413,"target_height":531}"#)
                .unwrap();
        assert_eq!(mode, CropMode::id_photo(false));
        assert_eq!(mode.name(), "fixed_id_format");
    }
}
