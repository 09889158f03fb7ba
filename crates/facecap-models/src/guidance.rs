//! User-facing framing guidance.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of the current camera framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceKind {
    /// The detector found no face
    NoFace,
    /// Face is too small in the frame
    TooFar,
    /// Face fills too much of the frame
    TooClose,
    /// Head is turned away from the camera
    NotFacingForward,
    /// Eyes or mouth are hidden
    Occluded,
    /// Framing is acceptable for capture
    Ready,
    /// No rule applied; the previous guidance stays on screen
    Unresolved,
}

impl GuidanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuidanceKind::NoFace => "no_face",
            GuidanceKind::TooFar => "too_far",
            GuidanceKind::TooClose => "too_close",
            GuidanceKind::NotFacingForward => "not_facing_forward",
            GuidanceKind::Occluded => "occluded",
            GuidanceKind::Ready => "ready",
            GuidanceKind::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for GuidanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visual affordance shown around the camera preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceColor {
    Red,
    Amber,
    Green,
}

/// Guidance for one sampled frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GuidanceState {
    pub kind: GuidanceKind,
    /// Message to display; `None` keeps whatever is already displayed
    pub message: Option<String>,
    pub color: GuidanceColor,
}

impl GuidanceState {
    pub fn new(kind: GuidanceKind, message: Option<&str>, color: GuidanceColor) -> Self {
        Self {
            kind,
            message: message.map(str::to_string),
            color,
        }
    }

    /// Whether a capture may be triggered.
    pub fn is_ready(&self) -> bool {
        self.kind == GuidanceKind::Ready
    }

    /// Resolve this state against what is currently displayed.
    ///
    /// An `Unresolved` state leaves the display untouched; a state without a
    /// message inherits the displayed message.
    pub fn carry_over(self, previous: Option<&GuidanceState>) -> GuidanceState {
        let Some(previous) = previous else {
            return self;
        };
        if self.kind == GuidanceKind::Unresolved {
            return previous.clone();
        }
        if self.message.is_some() {
            return self;
        }
        GuidanceState {
            message: previous.message.clone(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carry_over_message() {
        let prev = GuidanceState::new(GuidanceKind::TooFar, Some("Too far"), GuidanceColor::Red);
        let next = GuidanceState::new(GuidanceKind::Occluded, None, GuidanceColor::Amber);
        let shown = next.carry_over(Some(&prev));
        assert_eq!(shown.kind, GuidanceKind::Occluded);
        assert_eq!(shown.color, GuidanceColor::Amber);
        assert_eq!(shown.message.as_deref(), Some("Too far"));
    }

    #[test]
    fn test_carry_over_unresolved_keeps_previous() {
        let prev = GuidanceState::new(GuidanceKind::Ready, Some("Perfect!"), GuidanceColor::Green);
        let next = GuidanceState::new(GuidanceKind::Unresolved, None, GuidanceColor::Amber);
        assert_eq!(next.carry_over(Some(&prev)), prev);
    }

    #[test]
    fn test_carry_over_without_previous() {
        let next = GuidanceState::new(GuidanceKind::Unresolved, None, GuidanceColor::Amber);
        assert_eq!(next.clone().carry_over(None), next);
    }
}
