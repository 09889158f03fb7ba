//! Face-framing guidance and photo capture for FaceCap.
//!
//! This crate provides:
//! - Camera resolution negotiation over an ordered list of exact profiles
//! - Live framing guidance from face detector output
//! - Crop geometry for selfie and ID-photo framings
//! - Cropping, mirroring and encoding of the captured frame
//! - A capture pipeline tying these together on a sampling timer
//!
//! Camera devices and face detection models are external; they plug in
//! through [`CameraProvider`] and [`FaceDetector`].

pub mod camera;
pub mod config;
pub mod crop;
pub mod detector;
pub mod encode;
pub mod error;
pub mod guidance;
pub mod metrics;
pub mod pipeline;
pub mod testing;


pub use camera::{CameraProvider, CameraSession, ConstraintNegotiator, StreamHandle};
pub use config::{CaptureConfig, GuidanceThresholds};
pub use crop::CropGeometryEngine;
pub use detector::{FaceDetector, LazyDetector, ModelLoader};
pub use encode::{CapturedPhoto, PhotoEncoder};
pub use error::{CaptureError, CaptureResult};
pub use guidance::FaceGuidanceClassifier;
pub use pipeline::{CaptureOutcome, CapturePipeline, PipelineState, SampleOutcome};
