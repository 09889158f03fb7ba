//! Camera access and resolution negotiation.
//!
//! The device itself sits behind [`CameraProvider`]. A [`CameraSession`]
//! owns at most one live stream and releases it before every new
//! acquisition and on drop, so the device never has two streams open
//! for the same session.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use facecap_models::{
    ConstraintProfile, DeviceInfo, ProfilePreference, ResolutionHint, StreamRequest,
    StreamSettings, DEFAULT_PROFILES,
};

use crate::error::{CaptureError, CaptureResult};
use crate::metrics;

/// A live stream handed out by a [`CameraProvider`].
///
/// Handles are not `Clone`: whoever holds one is responsible for giving it
/// back through [`CameraProvider::release`].
#[derive(Debug, PartialEq, Eq)]
pub struct StreamHandle {
    id: Uuid,
    device_id: String,
    settings: StreamSettings,
}

impl StreamHandle {
    /// Create a handle for a freshly opened stream.
    pub fn new(device_id: impl Into<String>, settings: StreamSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.into(),
            settings,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} ({}x{})",
            self.id, self.device_id, self.settings.width, self.settings.height
        )
    }
}

/// Camera device capability.
#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// Open a stream satisfying `request`, or fail.
    async fn acquire(&self, request: &StreamRequest) -> CaptureResult<StreamHandle>;

    /// Stop a stream previously returned by [`CameraProvider::acquire`].
    fn release(&self, handle: StreamHandle);

    /// Latest frame of a live stream.
    async fn grab_frame(&self, handle: &StreamHandle) -> CaptureResult<DynamicImage>;
}

/// Owner of the single active stream of a capture flow.
pub struct CameraSession {
    provider: Arc<dyn CameraProvider>,
    stream: Option<StreamHandle>,
}

impl CameraSession {
    /// Create an empty session on top of a provider.
    pub fn new(provider: Arc<dyn CameraProvider>) -> Self {
        Self {
            provider,
            stream: None,
        }
    }

    /// Whether a stream is currently held.
    pub fn is_live(&self) -> bool {
        self.stream.is_some()
    }

    /// Settings of the held stream.
    pub fn settings(&self) -> Option<&StreamSettings> {
        self.stream.as_ref().map(StreamHandle::settings)
    }

    /// Device info of the held stream.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.stream
            .as_ref()
            .map(|s| DeviceInfo::from_settings(s.device_id(), s.settings()))
    }

    /// Release the held stream, if any.
    pub fn release(&mut self) {
        if let Some(handle) = self.stream.take() {
            debug!(stream = %handle, "Releasing camera stream");
            self.provider.release(handle);
        }
    }

    /// Release the current stream and open a new one for `request`.
    ///
    /// On failure the session is left empty.
    pub async fn open(&mut self, request: &StreamRequest) -> CaptureResult<StreamSettings> {
        self.release();
        let handle = self.provider.acquire(request).await?;
        let settings = *handle.settings();
        self.stream = Some(handle);
        Ok(settings)
    }

    /// Latest frame of the held stream.
    pub async fn grab_frame(&self) -> CaptureResult<DynamicImage> {
        match &self.stream {
            Some(handle) => self.provider.grab_frame(handle).await,
            None => Err(CaptureError::camera_failed("no live camera stream")),
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSession")
            .field("stream", &self.stream)
            .finish()
    }
}

/// Sequential probe over an ordered list of constraint profiles.
#[derive(Debug, Clone)]
pub struct ConstraintNegotiator {
    profiles: Vec<ConstraintProfile>,
}

impl ConstraintNegotiator {
    /// Negotiator trying `profiles` in exactly the given order.
    pub fn new(profiles: impl Into<Vec<ConstraintProfile>>) -> Self {
        Self {
            profiles: profiles.into(),
        }
    }

    /// Negotiator over the default profile table in the preferred order.
    pub fn from_preference(preference: ProfilePreference) -> Self {
        Self::new(preference.order(&DEFAULT_PROFILES))
    }

    /// Profiles in probe order.
    pub fn profiles(&self) -> &[ConstraintProfile] {
        &self.profiles
    }

    /// Acquire the first profile the device accepts.
    ///
    /// Each attempt releases whatever the session holds before asking the
    /// device for `{device_id, exact width, exact height}`. Returns as soon as
    /// one attempt succeeds; remaining profiles are not tried. When every
    /// profile fails the session holds nothing and `CameraUnavailable` is
    /// returned.
    pub async fn acquire(
        &self,
        session: &mut CameraSession,
        device_id: &str,
    ) -> CaptureResult<StreamSettings> {
        for (index, profile) in self.profiles.iter().enumerate() {
            let request = StreamRequest::exact(device_id, *profile);
            debug!(device_id, profile = %profile, index, "Trying camera profile");

            match session.open(&request).await {
                Ok(settings) => {
                    metrics::record_negotiation_attempt(&profile.to_string(), true);
                    info!(
                        device_id,
                        profile = %profile,
                        attempts = index + 1,
                        "Camera stream acquired"
                    );
                    return Ok(settings);
                }
                Err(e) => {
                    metrics::record_negotiation_attempt(&profile.to_string(), false);
                    debug!(device_id, profile = %profile, "Camera profile rejected: {}", e);
                }
            }
        }

        session.release();
        metrics::record_negotiation_failure();
        warn!(
            device_id,
            attempts = self.profiles.len(),
            "No camera profile could be acquired"
        );
        Err(CaptureError::CameraUnavailable {
            attempts: self.profiles.len(),
        })
    }

    /// Single acquisition attempt with a loose resolution hint.
    pub async fn acquire_with_hint(
        session: &mut CameraSession,
        hint: ResolutionHint,
        device_id: &str,
    ) -> CaptureResult<StreamSettings> {
        let request = hint.to_request(device_id);
        debug!(device_id, ?hint, "Acquiring camera with resolution hint");
        session.open(&request).await.map_err(|e| {
            warn!(device_id, ?hint, "Camera acquisition failed: {}", e);
            CaptureError::CameraUnavailable { attempts: 1 }
        })
    }
}

impl Default for ConstraintNegotiator {
    fn default() -> Self {
        Self::from_preference(ProfilePreference::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCamera;

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let camera = Arc::new(ScriptedCamera::new().fail_profiles(&[(320, 180), (320, 240), (640, 360)]));
        let mut session = CameraSession::new(camera.clone());

        let negotiator = ConstraintNegotiator::from_preference(ProfilePreference::LowestFirst);
        let settings = negotiator.acquire(&mut session, "cam0").await.unwrap();

        assert_eq!((settings.width, settings.height), (640, 480));
        assert_eq!(camera.attempts().len(), 4);
        assert_eq!(camera.live_streams(), 1);
        assert!(session.is_live());
    }

    #[tokio::test]
    async fn test_order_is_a_parameter() {
        let camera = Arc::new(ScriptedCamera::new());
        let mut session = CameraSession::new(camera.clone());

        let negotiator = ConstraintNegotiator::from_preference(ProfilePreference::HighestFirst);
        let settings = negotiator.acquire(&mut session, "cam0").await.unwrap();
        assert_eq!((settings.width, settings.height), (1920, 1080));

        let negotiator = ConstraintNegotiator::new(vec![ConstraintProfile::new(640, 480)]);
        let settings = negotiator.acquire(&mut session, "cam0").await.unwrap();
        assert_eq!((settings.width, settings.height), (640, 480));
        // Re-negotiation released the 1080p stream first
        assert_eq!(camera.live_streams(), 1);
        assert_eq!(camera.max_live_streams(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_leaves_session_empty() {
        let camera = Arc::new(ScriptedCamera::new().fail_all());
        let mut session = CameraSession::new(camera.clone());

        let err = ConstraintNegotiator::default()
            .acquire(&mut session, "cam0")
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::CameraUnavailable { attempts: 6 }));
        assert!(!session.is_live());
        assert_eq!(camera.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_existing_stream_released_even_when_all_fail() {
        let camera = Arc::new(ScriptedCamera::new().fail_profiles(&[(320, 180)]));
        let mut session = CameraSession::new(camera.clone());
        ConstraintNegotiator::new(vec![ConstraintProfile::new(640, 480)])
            .acquire(&mut session, "cam0")
            .await
            .unwrap();
        assert_eq!(camera.live_streams(), 1);

        let result = ConstraintNegotiator::new(vec![ConstraintProfile::new(320, 180)])
            .acquire(&mut session, "cam0")
            .await;
        assert!(result.is_err());
        assert_eq!(camera.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_empty_profile_list() {
        let camera = Arc::new(ScriptedCamera::new());
        let mut session = CameraSession::new(camera.clone());
        let err = ConstraintNegotiator::new(Vec::new())
            .acquire(&mut session, "cam0")
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::CameraUnavailable { attempts: 0 }));
        assert!(camera.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_acquire_with_hint_single_attempt() {
        let camera = Arc::new(ScriptedCamera::new());
        let mut session = CameraSession::new(camera.clone());
        let settings =
            ConstraintNegotiator::acquire_with_hint(&mut session, ResolutionHint::Maximum, "cam0")
                .await
                .unwrap();
        assert_eq!((settings.width, settings.height), (4096, 2160));
        assert_eq!(camera.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_session_drop_releases() {
        let camera = Arc::new(ScriptedCamera::new());
        {
            let mut session = CameraSession::new(camera.clone());
            ConstraintNegotiator::default()
                .acquire(&mut session, "cam0")
                .await
                .unwrap();
            assert_eq!(camera.live_streams(), 1);
            assert!(session.device_info().is_some());
        }
        assert_eq!(camera.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_grab_frame_without_stream() {
        let camera = Arc::new(ScriptedCamera::new());
        let session = CameraSession::new(camera);
        assert!(matches!(
            session.grab_frame().await,
            Err(CaptureError::CameraFailed(_))
        ));
    }
}
