//! Crop rectangle geometry.
//!
//! Two framings are supported:
//! - Proportional padding around the face box, asymmetric vertically so
//!   the forehead and chin both get room (selfie capture).
//! - A fixed-pixel ID frame whose bottom edge sits 30 px below the chin,
//!   centred horizontally on the face.

use tracing::debug;

use facecap_models::{BoundingBox, CropMode, CropRequest, CropResult};

use crate::error::{CaptureError, CaptureResult};

/// Vertical padding multiplier above the face box.
const TOP_PAD_RATIO: f64 = 1.95;

/// Vertical padding multiplier below the face box.
const BOTTOM_PAD_RATIO: f64 = 1.9;

/// Pixels kept between the chin and the bottom of an ID frame.
const ID_CHIN_MARGIN: f64 = 30.0;

/// Stateless crop computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CropGeometryEngine;

impl CropGeometryEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute the crop rectangle for a request.
    ///
    /// The result always lies within the source image; anything else is
    /// reported as `CropBoundsInvalid`.
    pub fn compute(&self, request: &CropRequest) -> CaptureResult<CropResult> {
        let (w, h) = (request.source_width, request.source_height);
        let rect = match request.mode {
            CropMode::ProportionalPadding { factor } => {
                Self::proportional_rect(&request.face_box, factor, w, h)
            }
            CropMode::FixedIdFormat {
                target_width,
                target_height,
                clamp_origin,
            } => Self::fixed_id_rect(
                &request.face_box,
                target_width,
                target_height,
                clamp_origin,
                w,
                h,
            ),
        };

        if !rect.fits_within(w, h) {
            debug!(
                mode = request.mode.name(),
                x = rect.x,
                y = rect.y,
                width = rect.width,
                height = rect.height,
                "Crop rectangle outside source"
            );
            return Err(CaptureError::CropBoundsInvalid {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                source_width: w,
                source_height: h,
            });
        }

        Ok(rect)
    }

    /// Face box padded by `factor` of its width, clamped to the source.
    pub fn proportional_rect(
        face: &BoundingBox,
        factor: f64,
        source_width: u32,
        source_height: u32,
    ) -> CropResult {
        let pad = face.width * factor;
        let x1 = (face.x - pad).max(0.0);
        let y1 = (face.y - TOP_PAD_RATIO * pad).max(0.0);
        let x2 = (face.x2() + pad).min(source_width as f64);
        let y2 = (face.y2() + BOTTOM_PAD_RATIO * pad).min(source_height as f64);
        CropResult::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Raw ID-frame geometry before bounds validation.
    ///
    /// Without `clamp_origin` the top edge may be negative when the face is
    /// high in a frame shorter than the target.
    pub fn fixed_id_rect(
        face: &BoundingBox,
        target_width: u32,
        target_height: u32,
        clamp_origin: bool,
        source_width: u32,
        source_height: u32,
    ) -> CropResult {
        let (sw, sh) = (source_width as f64, source_height as f64);
        let tw = target_width as f64;
        let th = (target_height as f64).min(sh);

        let crop_x = (face.cx() - tw / 2.0).max(0.0);
        let mut crop_y = face.y2() - th + ID_CHIN_MARGIN;
        if clamp_origin {
            crop_y = crop_y.max(0.0);
        }

        let crop_w = tw.min(sw - crop_x);
        let crop_h = th.min(sh - crop_y);
        CropResult::new(crop_x, crop_y, crop_w, crop_h)
    }
}
