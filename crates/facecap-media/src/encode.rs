//! Cropping, mirroring and encoding of the captured frame.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder};
use tracing::debug;

use facecap_models::{CropResult, EncodeOptions, MirrorBehavior, OutputFormat};

use crate::error::{CaptureError, CaptureResult};

/// An encoded photo ready to hand to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPhoto {
    /// Encoded image bytes
    pub data: Vec<u8>,
    pub format: OutputFormat,
    /// Encoded image width in pixels
    pub width: u32,
    /// Encoded image height in pixels
    pub height: u32,
    /// Rectangle of the source frame this photo was cut from
    pub crop: CropResult,
}

impl CapturedPhoto {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// `data:<mime>;base64,<payload>` URL of the encoded bytes.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), STANDARD.encode(&self.data))
    }
}

/// Crops a frame, mirrors it when required and encodes it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhotoEncoder {
    options: EncodeOptions,
    mirror: MirrorBehavior,
}

impl PhotoEncoder {
    pub fn new(options: EncodeOptions, mirror: MirrorBehavior) -> Self {
        Self { options, mirror }
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    /// Encode the `crop` region of `frame`.
    ///
    /// `facing_user` is the stream's reported facing mode; it only matters
    /// for [`MirrorBehavior::FlipWhenUserFacing`].
    pub fn encode(
        &self,
        frame: &DynamicImage,
        crop: &CropResult,
        facing_user: Option<bool>,
    ) -> CaptureResult<CapturedPhoto> {
        let rect = crop.to_pixels(frame.width(), frame.height());
        if rect.is_empty() {
            return Err(CaptureError::CropBoundsInvalid {
                x: crop.x,
                y: crop.y,
                width: crop.width,
                height: crop.height,
                source_width: frame.width(),
                source_height: frame.height(),
            });
        }

        let mut cropped = frame.crop_imm(rect.x, rect.y, rect.width, rect.height);
        if self.mirror.should_flip(facing_user) {
            cropped = cropped.fliph();
        }

        let data = encode_image(&cropped, &self.options)?;
        debug!(
            format = ?self.options.format,
            width = rect.width,
            height = rect.height,
            bytes = data.len(),
            "Encoded captured photo"
        );

        Ok(CapturedPhoto {
            data,
            format: self.options.format,
            width: rect.width,
            height: rect.height,
            crop: *crop,
        })
    }
}

fn encode_image(image: &DynamicImage, options: &EncodeOptions) -> CaptureResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());

    match options.format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = image.to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut buffer, options.quality);
            encoder
                .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
                .map_err(|e| CaptureError::Encode(e.to_string()))?;
        }
        OutputFormat::Png => {
            let rgba = image.to_rgba8();
            let encoder = PngEncoder::new(&mut buffer);
            encoder
                .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)
                .map_err(|e| CaptureError::Encode(e.to_string()))?;
        }
    }

    Ok(buffer.into_inner())
}
