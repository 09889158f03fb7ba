//! Live framing guidance.
//!
//! Rules are evaluated in a fixed order into a single tentative value; a
//! later rule whose condition holds overwrites whatever an earlier rule set.
//! The ratio rules run last, so they take precedence over the
//! orientation and occlusion rules whenever they fire.

use facecap_models::{DetectedFace, DetectionResult, GuidanceColor, GuidanceKind, GuidanceState};

use crate::config::GuidanceThresholds;

pub const MESSAGE_NO_FACE: &str = "No face detected";
pub const MESSAGE_FACE_FORWARD: &str = "Face forward";
pub const MESSAGE_READY: &str = "Perfect!";
pub const MESSAGE_TOO_FAR: &str = "Too far";
pub const MESSAGE_TOO_CLOSE: &str = "Too close";

/// Signals extracted from the primary face.
#[derive(Debug, Clone, Copy)]
struct FaceSignals {
    facing: bool,
    mouth: bool,
    eyes: bool,
    wrists: bool,
    ratio: f64,
}

impl FaceSignals {
    fn extract(
        face: &DetectedFace,
        frame_width: u32,
        frame_height: u32,
        thresholds: &GuidanceThresholds,
    ) -> Self {
        let frame_area = frame_width as f64 * frame_height as f64;
        let ratio = if frame_area > 0.0 {
            face.bbox.area() / frame_area
        } else {
            0.0
        };
        Self {
            facing: face.is_facing_center(),
            mouth: face.is_mouth_visible(),
            eyes: face.keypoints.eyes_visible(thresholds.min_eye_confidence),
            wrists: face.keypoints.wrists_visible(),
            ratio,
        }
    }
}

/// Tentative result threaded through the rule list.
struct Tentative {
    kind: GuidanceKind,
    message: Option<&'static str>,
    color: GuidanceColor,
}

impl Tentative {
    fn set(&mut self, kind: GuidanceKind, color: GuidanceColor, message: Option<&'static str>) {
        self.kind = kind;
        self.color = color;
        if message.is_some() {
            self.message = message;
        }
    }
}

/// Maps detector output and frame size to a guidance state.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaceGuidanceClassifier {
    thresholds: GuidanceThresholds,
}

impl FaceGuidanceClassifier {
    pub fn new(thresholds: GuidanceThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &GuidanceThresholds {
        &self.thresholds
    }

    /// Classify one detection. Pure: equal inputs give equal outputs.
    pub fn classify(
        &self,
        detection: &DetectionResult,
        frame_width: u32,
        frame_height: u32,
    ) -> GuidanceState {
        let Some(face) = detection.primary() else {
            return GuidanceState::new(GuidanceKind::NoFace, Some(MESSAGE_NO_FACE), GuidanceColor::Red);
        };

        let s = FaceSignals::extract(face, frame_width, frame_height, &self.thresholds);
        let t = &self.thresholds;

        let mut tentative = Tentative {
            kind: GuidanceKind::Unresolved,
            message: None,
            color: GuidanceColor::Amber,
        };

        // 1. orientation
        if !s.facing {
            tentative.set(
                GuidanceKind::NotFacingForward,
                GuidanceColor::Amber,
                Some(MESSAGE_FACE_FORWARD),
            );
        }

        // 2. occlusion; leaves the message alone
        if !s.mouth || !s.eyes {
            tentative.set(GuidanceKind::Occluded, GuidanceColor::Amber, None);
        }

        // 3-5. distance
        if s.ratio > t.min_face_ratio && s.ratio <= t.max_face_ratio && s.facing && !s.wrists {
            tentative.set(GuidanceKind::Ready, GuidanceColor::Green, Some(MESSAGE_READY));
        } else if s.ratio < t.min_face_ratio {
            tentative.set(GuidanceKind::TooFar, GuidanceColor::Red, Some(MESSAGE_TOO_FAR));
        } else if s.facing && s.ratio > t.max_face_ratio {
            tentative.set(GuidanceKind::TooClose, GuidanceColor::Amber, Some(MESSAGE_TOO_CLOSE));
        }

        GuidanceState::new(tentative.kind, tentative.message, tentative.color)
    }
}
