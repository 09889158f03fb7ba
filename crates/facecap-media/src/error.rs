//! Error types for capture operations.

use thiserror::Error;

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Errors that can occur while negotiating, guiding, cropping or encoding.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("No camera profile could be acquired after {attempts} attempts")]
    CameraUnavailable { attempts: usize },

    #[error("Camera failed: {0}")]
    CameraFailed(String),

    #[error("No face detected")]
    NoFaceDetected,

    #[error("Crop bounds invalid: ({x}, {y}, {width}, {height}) outside {source_width}x{source_height}")]
    CropBoundsInvalid {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        source_width: u32,
        source_height: u32,
    },

    #[error("Face detection model not loaded: {0}")]
    ModelLoadFailure(String),

    #[error("Face detection failed: {0}")]
    Detection(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot {operation} while pipeline is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Create a camera failure error.
    pub fn camera_failed(message: impl Into<String>) -> Self {
        Self::CameraFailed(message.into())
    }

    /// Create a model load failure error.
    pub fn model_load_failure(message: impl Into<String>) -> Self {
        Self::ModelLoadFailure(message.into())
    }

    /// Create a detection failure error.
    pub fn detection(message: impl Into<String>) -> Self {
        Self::Detection(message.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Decoding(e) => CaptureError::Decode(e.to_string()),
            image::ImageError::Unsupported(e) => CaptureError::Decode(e.to_string()),
            image::ImageError::IoError(e) => CaptureError::Io(e),
            other => CaptureError::Encode(other.to_string()),
        }
    }
}
