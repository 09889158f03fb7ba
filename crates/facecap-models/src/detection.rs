//! Face detector output consumed by guidance and cropping.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::geometry::BoundingBox;

/// Gesture tag emitted when the head is turned towards the camera.
pub const GESTURE_FACING_CENTER: &str = "facing center";

/// A landmark the detector located, with its confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Keypoint {
    /// Detection confidence (0.0-1.0)
    pub score: f64,
}

impl Keypoint {
    pub fn new(score: f64) -> Self {
        Self { score }
    }
}

/// Body landmarks relevant to framing. `None` means not found.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Keypoints {
    pub left_eye: Option<Keypoint>,
    pub right_eye: Option<Keypoint>,
    pub left_wrist: Option<Keypoint>,
    pub right_wrist: Option<Keypoint>,
}

impl Keypoints {
    /// Both eyes found with a score above `min_confidence`.
    pub fn eyes_visible(&self, min_confidence: f64) -> bool {
        match (self.left_eye, self.right_eye) {
            (Some(left), Some(right)) => left.score > min_confidence && right.score > min_confidence,
            _ => false,
        }
    }

    /// Either wrist found at any confidence.
    pub fn wrists_visible(&self) -> bool {
        self.left_wrist.is_some() || self.right_wrist.is_some()
    }
}

/// One detected face.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFace {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub keypoints: Keypoints,
    #[serde(default)]
    pub gestures: BTreeSet<String>,
}

impl DetectedFace {
    /// Face with only a bounding box.
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            ..Default::default()
        }
    }

    /// Builder: attach keypoints.
    pub fn with_keypoints(mut self, keypoints: Keypoints) -> Self {
        self.keypoints = keypoints;
        self
    }

    /// Builder: add a gesture tag.
    pub fn with_gesture(mut self, gesture: impl Into<String>) -> Self {
        self.gestures.insert(gesture.into());
        self
    }

    /// Head turned towards the camera. Dashes and spaces are interchangeable.
    pub fn is_facing_center(&self) -> bool {
        self.gestures
            .iter()
            .any(|g| g.replace('-', " ").eq_ignore_ascii_case(GESTURE_FACING_CENTER))
    }

    /// Any gesture mentions the mouth.
    pub fn is_mouth_visible(&self) -> bool {
        self.gestures.iter().any(|g| g.contains("mouth"))
    }
}

/// Result of one detector invocation. Only the first face is consulted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct DetectionResult {
    #[serde(default)]
    pub faces: Vec<DetectedFace>,
}

impl DetectionResult {
    /// Result with no faces.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Result with a single face.
    pub fn single(face: DetectedFace) -> Self {
        Self { faces: vec![face] }
    }

    /// The face that drives guidance and cropping.
    pub fn primary(&self) -> Option<&DetectedFace> {
        self.faces.first()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_center_accepts_dash() {
        let face = DetectedFace::new(BoundingBox::default()).with_gesture("facing-center");
        assert!(face.is_facing_center());
        let face = DetectedFace::new(BoundingBox::default()).with_gesture("facing center");
        assert!(face.is_facing_center());
        let face = DetectedFace::new(BoundingBox::default()).with_gesture("facing left");
        assert!(!face.is_facing_center());
    }

    #[test]
    fn test_mouth_substring() {
        let face = DetectedFace::new(BoundingBox::default()).with_gesture("mouth 10% open");
        assert!(face.is_mouth_visible());
    }

    #[test]
    fn test_eye_threshold_is_exclusive() {
        let kp = Keypoints {
            left_eye: Some(Keypoint::new(0.2)),
            right_eye: Some(Keypoint::new(0.9)),
            ..Default::default()
        };
        assert!(!kp.eyes_visible(0.2));
        let kp = Keypoints {
            left_eye: Some(Keypoint::new(0.21)),
            right_eye: Some(Keypoint::new(0.9)),
            ..Default::default()
        };
        assert!(kp.eyes_visible(0.2));
        assert!(!Keypoints::default().eyes_visible(0.2));
    }

    #[test]
    fn test_detection_json() {
        let json = r#"{
            "faces": [{
                "box": {"x": 100, "y": 100, "width": 200, "height": 200},
                "keypoints": {"leftWrist": {"score": 0.4}},
                "gestures": ["facing center"]
            }]
        }"#;
        let result: DetectionResult = serde_json::from_str(json).unwrap();
        let face = result.primary().unwrap();
        assert_eq!(face.bbox.width, 200.0);
        assert!(face.keypoints.wrists_visible());
        assert!(face.is_facing_center());
        assert!(DetectionResult::empty().primary().is_none());
    }
}
