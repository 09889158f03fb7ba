//! Shared data models for the FaceCap capture pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Camera constraint profiles, stream requests and device info
//! - Face detector output (boxes, keypoints, gestures)
//! - Framing guidance states
//! - Crop requests and crop rectangles
//! - Output encoding settings

pub mod camera;
pub mod detection;
pub mod encoding;
pub mod error;
pub mod geometry;
pub mod guidance;

// Re-export common types
pub use camera::{
    ConstraintProfile, DeviceInfo, MirrorBehavior, ProfilePreference, Resolution, ResolutionHint,
    SizeConstraint, StreamRequest, StreamSettings, DEFAULT_PROFILES,
};
pub use detection::{DetectedFace, DetectionResult, Keypoint, Keypoints, GESTURE_FACING_CENTER};
pub use encoding::{EncodeOptions, OutputFormat, DEFAULT_JPEG_QUALITY};
pub use error::{ModelError, ModelResult};
pub use geometry::{
    BoundingBox, CropMode, CropRequest, CropResult, PixelRect, ID_PHOTO_HEIGHT, ID_PHOTO_WIDTH,
    SELFIE_PADDING_FACTOR,
};
pub use guidance::{GuidanceColor, GuidanceKind, GuidanceState};
