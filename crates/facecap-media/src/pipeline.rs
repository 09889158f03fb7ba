//! Live capture pipeline.
//!
//! Drives one capture flow end to end: negotiate a camera stream, sample
//! frames on a fixed interval to produce framing guidance, and on request
//! crop and encode the current frame once the framing is acceptable.
//!
//! ```text
//! Idle -> Negotiating -> Live -> Capturing -> Done
//!   ^         |           ^  \______/         |
//!   |_________|           |___________________|   (start again)
//! ```
//!
//! Teardown (`reset` or drop) is valid from any state: it stops the
//! sampling timer, releases the stream and bumps the generation so that
//! detections still in flight are discarded when they resolve.
//!
//! At most one detection runs per generation. Samples skip while the
//! detection slot is held; a capture waits for it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use facecap_models::{
    ConstraintProfile, CropMode, CropRequest, DeviceInfo, GuidanceState, StreamSettings,
};

use crate::camera::{CameraProvider, CameraSession, ConstraintNegotiator};
use crate::config::CaptureConfig;
use crate::crop::CropGeometryEngine;
use crate::detector::FaceDetector;
use crate::encode::{CapturedPhoto, PhotoEncoder};
use crate::error::{CaptureError, CaptureResult};
use crate::guidance::FaceGuidanceClassifier;
use crate::metrics;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle state of a [`CapturePipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Negotiating,
    Live,
    Capturing,
    Done,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Negotiating => "negotiating",
            PipelineState::Live => "live",
            PipelineState::Capturing => "capturing",
            PipelineState::Done => "done",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single guidance sample did.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// A detection was already in flight
    Skipped,
    /// Guidance was published; carries the state now displayed
    Updated(GuidanceState),
    /// No detection result this time (model not loaded, frame or detector error)
    NoResult,
    /// Pipeline was not live, or was torn down while detecting
    Ignored,
}

/// What a capture request did.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Pipeline was not live or framing was not ready
    Ignored,
    Captured(CapturedPhoto),
}

/// Held for the duration of one detection; released on every path by drop.
type DetectionGuard = OwnedMutexGuard<()>;

struct PipelineInner {
    detector: Arc<dyn FaceDetector>,
    classifier: FaceGuidanceClassifier,
    crop_engine: CropGeometryEngine,
    encoder: PhotoEncoder,
    config: CaptureConfig,
    session: tokio::sync::Mutex<CameraSession>,
    state: Mutex<PipelineState>,
    guidance: watch::Sender<Option<GuidanceState>>,
    detection_slot: Mutex<Arc<AsyncMutex<()>>>,
    generation: AtomicU64,
    last_capture: Mutex<Option<CapturedPhoto>>,
    device_info: Mutex<Option<DeviceInfo>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineInner {
    fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    fn set_state(&self, next: PipelineState) {
        let mut state = lock(&self.state);
        if *state != next {
            debug!(from = %*state, to = %next, "Pipeline state change");
            *state = next;
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Slot of the current generation.
    fn detection_slot(&self) -> Arc<AsyncMutex<()>> {
        lock(&self.detection_slot).clone()
    }

    fn try_begin_detection(&self) -> Option<DetectionGuard> {
        self.detection_slot().try_lock_owned().ok()
    }

    async fn begin_detection(&self) -> DetectionGuard {
        self.detection_slot().lock_owned().await
    }

    /// Orphan in-flight detections: fresh slot first, then a new generation.
    /// A detection that reads the new generation always holds the new slot.
    fn invalidate(&self) {
        *lock(&self.detection_slot) = Arc::new(AsyncMutex::new(()));
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_ticker(&self) {
        if let Some(handle) = lock(&self.ticker).take() {
            handle.abort();
        }
    }

    /// Spawn the recurring sampler. Each tick runs one sample in its own task.
    fn spawn_ticker(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sample_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                tokio::spawn(async move {
                    inner.sample().await;
                });
            }
        });

        if let Some(previous) = lock(&self.ticker).replace(handle) {
            previous.abort();
        }
    }

    async fn sample(&self) -> SampleOutcome {
        if self.state() != PipelineState::Live {
            return SampleOutcome::Ignored;
        }
        let generation = self.generation();
        let Some(_guard) = self.try_begin_detection() else {
            metrics::record_sample_skipped();
            debug!("Detection still in flight, skipping sample");
            return SampleOutcome::Skipped;
        };

        let frame = {
            let session = self.session.lock().await;
            if !session.is_live() {
                return SampleOutcome::Ignored;
            }
            match session.grab_frame().await {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Failed to grab frame for guidance: {}", e);
                    return SampleOutcome::NoResult;
                }
            }
        };

        let started = Instant::now();
        let detection = match self.detector.detect(&frame).await {
            Ok(detection) => detection,
            Err(CaptureError::ModelLoadFailure(reason)) => {
                debug!(reason = %reason, "Detector not ready, no guidance yet");
                return SampleOutcome::NoResult;
            }
            Err(e) => {
                warn!("Face detection failed: {}", e);
                return SampleOutcome::NoResult;
            }
        };
        metrics::record_sample(started.elapsed().as_secs_f64());

        if generation != self.generation() || self.state() != PipelineState::Live {
            debug!(generation, "Discarding stale detection");
            return SampleOutcome::Ignored;
        }

        let classified = self
            .classifier
            .classify(&detection, frame.width(), frame.height());
        metrics::record_guidance(classified.kind.as_str());

        let mut shown = classified.clone();
        self.guidance.send_modify(|current| {
            shown = classified.carry_over(current.as_ref());
            *current = Some(shown.clone());
        });
        debug!(kind = %shown.kind, message = ?shown.message, "Guidance updated");

        SampleOutcome::Updated(shown)
    }

    /// Grab, detect, crop and encode one frame.
    async fn take_photo(&self, mode: CropMode) -> CaptureResult<CapturedPhoto> {
        let (frame, settings): (_, StreamSettings) = {
            let session = self.session.lock().await;
            let settings = session
                .settings()
                .copied()
                .ok_or_else(|| CaptureError::camera_failed("no live camera stream"))?;
            (session.grab_frame().await?, settings)
        };

        let detection = self.detector.detect(&frame).await?;
        let face = detection.primary().ok_or(CaptureError::NoFaceDetected)?;

        let request = CropRequest::new(frame.width(), frame.height(), face.bbox, mode);
        let crop = self.crop_engine.compute(&request)?;

        self.encoder.encode(&frame, &crop, settings.facing_user)
    }
}

/// Capture flow over a camera and a face detector.
///
/// Dropping the pipeline tears it down like [`CapturePipeline::reset`].
pub struct CapturePipeline {
    inner: Arc<PipelineInner>,
}

impl CapturePipeline {
    /// Create an idle pipeline. Fails if `config` does not validate.
    pub fn new(
        camera: Arc<dyn CameraProvider>,
        detector: Arc<dyn FaceDetector>,
        config: CaptureConfig,
    ) -> CaptureResult<Self> {
        config.validate()?;
        let (guidance, _) = watch::channel(None);

        let inner = PipelineInner {
            detector,
            classifier: FaceGuidanceClassifier::new(config.guidance),
            crop_engine: CropGeometryEngine::new(),
            encoder: PhotoEncoder::new(config.encode, config.mirror),
            session: tokio::sync::Mutex::new(CameraSession::new(camera)),
            state: Mutex::new(PipelineState::Idle),
            guidance,
            detection_slot: Mutex::new(Arc::new(AsyncMutex::new(()))),
            generation: AtomicU64::new(0),
            last_capture: Mutex::new(None),
            device_info: Mutex::new(None),
            ticker: Mutex::new(None),
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.inner.config
    }

    pub fn state(&self) -> PipelineState {
        self.inner.state()
    }

    /// Guidance currently displayed.
    pub fn guidance(&self) -> Option<GuidanceState> {
        self.inner.guidance.borrow().clone()
    }

    /// Receiver notified whenever the displayed guidance changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<GuidanceState>> {
        self.inner.guidance.subscribe()
    }

    /// Most recent successful capture. Survives failed attempts and resets.
    pub fn last_capture(&self) -> Option<CapturedPhoto> {
        lock(&self.inner.last_capture).clone()
    }

    /// Negotiated camera, while a stream is held.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        lock(&self.inner.device_info).clone()
    }

    /// Teardown counter; bumped by every reset.
    pub fn generation(&self) -> u64 {
        self.inner.generation()
    }

    /// Start with the default profile table in the configured order.
    pub async fn start_default(&self, device_id: &str) -> CaptureResult<DeviceInfo> {
        let negotiator = ConstraintNegotiator::from_preference(self.inner.config.profile_preference);
        self.start(device_id, negotiator.profiles()).await
    }

    /// Negotiate a stream over `profiles` and start live sampling.
    ///
    /// Valid from `Idle` and `Done`. When no profile is accepted the
    /// pipeline returns to `Idle` with `CameraUnavailable`.
    pub async fn start(
        &self,
        device_id: &str,
        profiles: &[ConstraintProfile],
    ) -> CaptureResult<DeviceInfo> {
        let inner = &self.inner;
        {
            let mut state = lock(&inner.state);
            match *state {
                PipelineState::Idle | PipelineState::Done => *state = PipelineState::Negotiating,
                other => {
                    return Err(CaptureError::InvalidState {
                        operation: "start",
                        state: other.as_str(),
                    })
                }
            }
        }
        inner.guidance.send_replace(None);
        let generation = inner.generation();

        info!(device_id, profiles = profiles.len(), "Starting capture pipeline");

        let mut session = inner.session.lock().await;
        let negotiator = ConstraintNegotiator::new(profiles.to_vec());
        let settings = match negotiator.acquire(&mut session, device_id).await {
            Ok(settings) => settings,
            Err(e) => {
                if generation == inner.generation() {
                    inner.set_state(PipelineState::Idle);
                }
                return Err(e);
            }
        };

        if generation != inner.generation() {
            session.release();
            return Err(CaptureError::camera_failed("camera start cancelled by reset"));
        }

        let device = DeviceInfo::from_settings(device_id, &settings);
        *lock(&inner.device_info) = Some(device.clone());
        inner.set_state(PipelineState::Live);
        inner.spawn_ticker();

        info!(
            device_id,
            width = settings.width,
            height = settings.height,
            facing_user = ?settings.facing_user,
            interval_ms = inner.config.sample_interval.as_millis() as u64,
            "Capture pipeline live"
        );
        Ok(device)
    }

    /// Run one guidance sample now.
    ///
    /// The timer started by [`CapturePipeline::start`] calls this on every
    /// tick; calling it directly is useful for manual stepping.
    pub async fn sample(&self) -> SampleOutcome {
        self.inner.sample().await
    }

    /// Capture a photo with the configured selfie crop.
    pub async fn capture_selfie(&self) -> CaptureResult<CaptureOutcome> {
        let mode = self.inner.config.selfie_mode();
        self.capture(mode).await
    }

    /// Capture a photo with the configured ID-photo crop.
    pub async fn capture_id_photo(&self) -> CaptureResult<CaptureOutcome> {
        let mode = self.inner.config.id_photo_mode();
        self.capture(mode).await
    }

    /// Capture a photo if the pipeline is live and the framing is ready.
    ///
    /// A guidance sample still detecting is waited for first, and the
    /// framing is judged on what it published.
    ///
    /// Otherwise nothing happens and `Ignored` is returned. A failed attempt
    /// (no face, bad crop, detector error) returns the pipeline to `Live`
    /// and keeps any earlier capture. On success the photo is stored, the
    /// timer stops, the stream is released and the pipeline is `Done`.
    pub async fn capture(&self, mode: CropMode) -> CaptureResult<CaptureOutcome> {
        let inner = &self.inner;
        let generation = inner.generation();
        let _guard = inner.begin_detection().await;
        {
            let mut state = lock(&inner.state);
            let ready = inner
                .guidance
                .borrow()
                .as_ref()
                .is_some_and(GuidanceState::is_ready);
            if generation != inner.generation() || *state != PipelineState::Live || !ready {
                debug!(state = %*state, ready, "Capture ignored");
                metrics::record_capture(mode.name(), "ignored");
                return Ok(CaptureOutcome::Ignored);
            }
            *state = PipelineState::Capturing;
        }
        info!(mode = mode.name(), "Capturing photo");

        let result = inner.take_photo(mode).await;

        let mut session = inner.session.lock().await;
        if generation != inner.generation() {
            debug!("Pipeline reset during capture, discarding result");
            return Ok(CaptureOutcome::Ignored);
        }

        match result {
            Ok(photo) => {
                *lock(&inner.last_capture) = Some(photo.clone());
                inner.stop_ticker();
                session.release();
                *lock(&inner.device_info) = None;
                inner.set_state(PipelineState::Done);
                metrics::record_capture(mode.name(), "captured");
                info!(
                    mode = mode.name(),
                    width = photo.width,
                    height = photo.height,
                    bytes = photo.size(),
                    "Photo captured"
                );
                Ok(CaptureOutcome::Captured(photo))
            }
            Err(e) => {
                inner.set_state(PipelineState::Live);
                metrics::record_capture(mode.name(), "failed");
                warn!(mode = mode.name(), "Capture failed: {}", e);
                Err(e)
            }
        }
    }

    /// Stop sampling, release the stream and return to `Idle`.
    pub async fn reset(&self) {
        let inner = &self.inner;
        inner.invalidate();

        let mut session = inner.session.lock().await;
        inner.stop_ticker();
        session.release();
        *lock(&inner.device_info) = None;
        inner.guidance.send_replace(None);
        inner.set_state(PipelineState::Idle);
        info!(generation = inner.generation(), "Capture pipeline reset");
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        let inner = &self.inner;
        inner.invalidate();
        inner.stop_ticker();
        // A task holding the session releases it when the last reference goes
        if let Ok(mut session) = inner.session.try_lock() {
            session.release();
        }
        inner.set_state(PipelineState::Idle);
    }
}

impl fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}
