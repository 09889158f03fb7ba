//! Capture pipeline configuration.

use std::time::Duration;

use facecap_models::{
    CropMode, EncodeOptions, MirrorBehavior, OutputFormat, ProfilePreference, DEFAULT_JPEG_QUALITY,
    ID_PHOTO_HEIGHT, ID_PHOTO_WIDTH, SELFIE_PADDING_FACTOR,
};

use crate::error::{CaptureError, CaptureResult};

/// Thresholds used by the guidance classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuidanceThresholds {
    /// Face/frame area ratio below which the subject is too far (default: 0.2)
    pub min_face_ratio: f64,
    /// Face/frame area ratio above which the subject is too close (default: 0.8)
    pub max_face_ratio: f64,
    /// Eye keypoints at or below this score count as hidden (default: 0.2)
    pub min_eye_confidence: f64,
}

impl Default for GuidanceThresholds {
    fn default() -> Self {
        Self {
            min_face_ratio: 0.2,
            max_face_ratio: 0.8,
            min_eye_confidence: 0.2,
        }
    }
}

/// Capture configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Interval between live guidance samples
    pub sample_interval: Duration,
    /// Padding factor for the selfie crop
    pub padding_factor: f64,
    /// ID-photo target width in pixels
    pub id_target_width: u32,
    /// ID-photo target height in pixels
    pub id_target_height: u32,
    /// Clamp a negative ID-crop top edge to zero instead of rejecting the crop
    pub clamp_id_origin: bool,
    /// Output encoding
    pub encode: EncodeOptions,
    /// Mirroring of captured photos
    pub mirror: MirrorBehavior,
    /// Default negotiation order over the profile table
    pub profile_preference: ProfilePreference,
    /// Guidance thresholds
    pub guidance: GuidanceThresholds,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(500),
            padding_factor: SELFIE_PADDING_FACTOR,
            id_target_width: ID_PHOTO_WIDTH,
            id_target_height: ID_PHOTO_HEIGHT,
            clamp_id_origin: false,
            encode: EncodeOptions::default(),
            mirror: MirrorBehavior::default(),
            profile_preference: ProfilePreference::HighestFirst,
            guidance: GuidanceThresholds::default(),
        }
    }
}

impl CaptureConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let guidance_defaults = GuidanceThresholds::default();

        Self {
            sample_interval: Duration::from_millis(
                env_parse("FACECAP_SAMPLE_INTERVAL_MS")
                    .unwrap_or(defaults.sample_interval.as_millis() as u64),
            ),
            padding_factor: env_parse("FACECAP_PADDING_FACTOR").unwrap_or(defaults.padding_factor),
            id_target_width: env_parse("FACECAP_ID_WIDTH").unwrap_or(defaults.id_target_width),
            id_target_height: env_parse("FACECAP_ID_HEIGHT").unwrap_or(defaults.id_target_height),
            clamp_id_origin: std::env::var("FACECAP_CLAMP_ID_ORIGIN")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.clamp_id_origin),
            encode: EncodeOptions {
                format: env_parse::<OutputFormat>("FACECAP_OUTPUT_FORMAT")
                    .unwrap_or(defaults.encode.format),
                quality: env_parse("FACECAP_OUTPUT_QUALITY").unwrap_or(DEFAULT_JPEG_QUALITY),
            },
            mirror: env_parse("FACECAP_MIRROR").unwrap_or(defaults.mirror),
            profile_preference: env_parse("FACECAP_PROFILE_PREFERENCE")
                .unwrap_or(defaults.profile_preference),
            guidance: GuidanceThresholds {
                min_face_ratio: env_parse("FACECAP_MIN_FACE_RATIO")
                    .unwrap_or(guidance_defaults.min_face_ratio),
                max_face_ratio: env_parse("FACECAP_MAX_FACE_RATIO")
                    .unwrap_or(guidance_defaults.max_face_ratio),
                min_eye_confidence: env_parse("FACECAP_MIN_EYE_CONFIDENCE")
                    .unwrap_or(guidance_defaults.min_eye_confidence),
            },
        }
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> CaptureResult<()> {
        if self.sample_interval.is_zero() {
            return Err(CaptureError::invalid_config("sample interval must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.padding_factor) {
            return Err(CaptureError::invalid_config(format!(
                "padding factor must be between 0.0 and 1.0, got {}",
                self.padding_factor
            )));
        }
        if self.id_target_width == 0 || self.id_target_height == 0 {
            return Err(CaptureError::invalid_config("ID target size must be > 0"));
        }
        if !(1..=100).contains(&self.encode.quality) {
            return Err(CaptureError::invalid_config(format!(
                "output quality must be between 1 and 100, got {}",
                self.encode.quality
            )));
        }
        let g = &self.guidance;
        if !(0.0 <= g.min_face_ratio && g.min_face_ratio <= g.max_face_ratio) {
            return Err(CaptureError::invalid_config(format!(
                "face ratio thresholds out of order: {} / {}",
                g.min_face_ratio, g.max_face_ratio
            )));
        }
        Ok(())
    }

    /// Selfie crop mode for this configuration.
    pub fn selfie_mode(&self) -> CropMode {
        CropMode::ProportionalPadding {
            factor: self.padding_factor,
        }
    }

    /// ID-photo crop mode for this configuration.
    pub fn id_photo_mode(&self) -> CropMode {
        CropMode::FixedIdFormat {
            target_width: self.id_target_width,
            target_height: self.id_target_height,
            clamp_origin: self.clamp_id_origin,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_interval, Duration::from_millis(500));
        assert_eq!(config.selfie_mode(), CropMode::selfie());
        assert_eq!(config.id_photo_mode(), CropMode::id_photo(false));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CaptureConfig {
            padding_factor: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CaptureError::InvalidConfig(_))));

        let config = CaptureConfig {
            sample_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CaptureConfig {
            guidance: GuidanceThresholds {
                min_face_ratio: 0.9,
                max_face_ratio: 0.5,
                min_eye_confidence: 0.2,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
