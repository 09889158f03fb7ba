//! Camera constraint profiles and stream descriptions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// An explicit camera resolution request (exact width and height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintProfile {
    /// Exact frame width in pixels
    pub exact_width: u32,
    /// Exact frame height in pixels
    pub exact_height: u32,
}

impl ConstraintProfile {
    /// Create a new profile.
    pub const fn new(exact_width: u32, exact_height: u32) -> Self {
        Self {
            exact_width,
            exact_height,
        }
    }

    /// Pixel count of the profile.
    pub fn pixels(&self) -> u64 {
        self.exact_width as u64 * self.exact_height as u64
    }
}

impl fmt::Display for ConstraintProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.exact_width, self.exact_height)
    }
}

/// Resolution ladder probed by the selfie camera, lowest first.
pub const DEFAULT_PROFILES: [ConstraintProfile; 6] = [
    ConstraintProfile::new(320, 180),
    ConstraintProfile::new(320, 240),
    ConstraintProfile::new(640, 360),
    ConstraintProfile::new(640, 480),
    ConstraintProfile::new(1280, 720),
    ConstraintProfile::new(1920, 1080),
];

/// Which end of a profile table negotiation should start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProfilePreference {
    /// Try the largest resolution first
    #[default]
    HighestFirst,
    /// Try the smallest resolution first
    LowestFirst,
}

impl ProfilePreference {
    /// Order `table` (given lowest first) according to this preference.
    pub fn order(&self, table: &[ConstraintProfile]) -> Vec<ConstraintProfile> {
        match self {
            ProfilePreference::LowestFirst => table.to_vec(),
            ProfilePreference::HighestFirst => table.iter().rev().copied().collect(),
        }
    }
}

impl FromStr for ProfilePreference {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "highest_first" | "highest" | "high" => Ok(Self::HighestFirst),
            "lowest_first" | "lowest" | "low" => Ok(Self::LowestFirst),
            other => Err(ModelError::UnknownVariant {
                kind: "profile preference",
                value: other.to_string(),
            }),
        }
    }
}

/// A single dimension constraint passed to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SizeConstraint {
    /// The camera must deliver exactly this size or fail
    Exact(u32),
    /// The camera should get as close as it can
    Ideal(u32),
    /// No constraint
    #[default]
    Any,
}

/// Constraints for one stream acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    /// Device to open
    pub device_id: String,
    /// Width constraint
    pub width: SizeConstraint,
    /// Height constraint
    pub height: SizeConstraint,
}

impl StreamRequest {
    /// Exact-size request built from a constraint profile.
    pub fn exact(device_id: impl Into<String>, profile: ConstraintProfile) -> Self {
        Self {
            device_id: device_id.into(),
            width: SizeConstraint::Exact(profile.exact_width),
            height: SizeConstraint::Exact(profile.exact_height),
        }
    }
}

/// Loose resolution hint for a single, non-negotiated acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionHint {
    /// Let the camera pick
    #[default]
    Auto,
    /// Ask for the largest frames the camera supports
    Maximum,
    /// Ask for frames close to the given size
    Nearest { width: u32, height: u32 },
}

impl ResolutionHint {
    /// Ideal size requested for `Maximum` (4K DCI-ish).
    pub const MAXIMUM_WIDTH: u32 = 4096;
    pub const MAXIMUM_HEIGHT: u32 = 2160;

    /// Build the stream request for this hint.
    pub fn to_request(&self, device_id: impl Into<String>) -> StreamRequest {
        let (width, height) = match *self {
            ResolutionHint::Auto => (SizeConstraint::Any, SizeConstraint::Any),
            ResolutionHint::Maximum => (
                SizeConstraint::Ideal(Self::MAXIMUM_WIDTH),
                SizeConstraint::Ideal(Self::MAXIMUM_HEIGHT),
            ),
            ResolutionHint::Nearest { width, height } => {
                (SizeConstraint::Ideal(width), SizeConstraint::Ideal(height))
            }
        };
        StreamRequest {
            device_id: device_id.into(),
            width,
            height,
        }
    }
}

/// Settings the camera reports for an acquired stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    /// Delivered frame width
    pub width: u32,
    /// Delivered frame height
    pub height: u32,
    /// Whether the camera faces the user, when the device reports it
    pub facing_user: Option<bool>,
}

/// A resolution pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Description of the negotiated camera, surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub is_facing_user: Option<bool>,
    pub capture_resolution: Option<Resolution>,
}

impl DeviceInfo {
    /// Build device info from the settings of an acquired stream.
    pub fn from_settings(device_id: impl Into<String>, settings: &StreamSettings) -> Self {
        let capture_resolution = (settings.width > 0 && settings.height > 0).then_some(Resolution {
            width: settings.width,
            height: settings.height,
        });
        Self {
            device_id: device_id.into(),
            is_facing_user: settings.facing_user,
            capture_resolution,
        }
    }
}

/// Whether captured images are mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MirrorBehavior {
    /// Flip horizontally when the camera faces the user
    #[default]
    FlipWhenUserFacing,
    /// Never flip
    NoFlipping,
}

impl MirrorBehavior {
    /// Whether a frame from a camera with the given facing should be flipped.
    pub fn should_flip(&self, facing_user: Option<bool>) -> bool {
        matches!(self, MirrorBehavior::FlipWhenUserFacing) && facing_user == Some(true)
    }
}

impl FromStr for MirrorBehavior {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flip_when_user_facing" | "flip" => Ok(Self::FlipWhenUserFacing),
            "no_flipping" | "none" | "off" => Ok(Self::NoFlipping),
            other => Err(ModelError::UnknownVariant {
                kind: "mirror behavior",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profiles_ascending() {
        for pair in DEFAULT_PROFILES.windows(2) {
            assert!(pair[0].pixels() < pair[1].pixels());
        }
    }

    #[test]
    fn test_preference_order() {
        let high = ProfilePreference::HighestFirst.order(&DEFAULT_PROFILES);
        assert_eq!(high[0], ConstraintProfile::new(1920, 1080));
        assert_eq!(high[5], ConstraintProfile::new(320, 180));

        let low = ProfilePreference::LowestFirst.order(&DEFAULT_PROFILES);
        assert_eq!(low[0], ConstraintProfile::new(320, 180));
    }

    #[test]
    fn test_hint_requests() {
        let req = ResolutionHint::Maximum.to_request("cam0");
        assert_eq!(req.width, SizeConstraint::Ideal(4096));
        assert_eq!(req.height, SizeConstraint::Ideal(2160));

        let req = ResolutionHint::Auto.to_request("cam0");
        assert_eq!(req.width, SizeConstraint::Any);

        let req = ResolutionHint::Nearest {
            width: 800,
            height: 600,
        }
        .to_request("cam0");
        assert_eq!(req.width, SizeConstraint::Ideal(800));
    }

    #[test]
    fn test_mirror_only_user_facing() {
        let mirror = MirrorBehavior::FlipWhenUserFacing;
        assert!(mirror.should_flip(Some(true)));
        assert!(!mirror.should_flip(Some(false)));
        assert!(!mirror.should_flip(None));
        assert!(!MirrorBehavior::NoFlipping.should_flip(Some(true)));
    }

    #[test]
    fn test_profile_serde_camel_case() {
        let json = serde_json::to_string(&ConstraintProfile::new(640, 480)).unwrap();
        assert_eq!(json, r#"{"exactWidth":640,"exactHeight":480}"#);
    }

    #[test]
    fn test_preference_from_str() {
        assert_eq!(
            "lowest".parse::<ProfilePreference>().unwrap(),
            ProfilePreference::LowestFirst
        );
        let err: ModelResult<ProfilePreference> = "sideways".parse();
        assert_eq!(
            err,
            Err(ModelError::UnknownVariant {
                kind: "profile preference",
                value: "sideways".to_string()
            })
        );
    }
}
