//! In-memory collaborators.
//!
//! Used by the test suites and by offline runs that replay a still image
//! through the live pipeline.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, RgbImage};

use facecap_models::{DetectionResult, SizeConstraint, StreamRequest, StreamSettings};

use crate::camera::{CameraProvider, StreamHandle};
use crate::detector::{FaceDetector, ModelLoader};
use crate::error::{CaptureError, CaptureResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Camera that accepts or rejects requests by size and serves a fixed frame.
#[derive(Debug)]
pub struct ScriptedCamera {
    rejected: HashSet<(u32, u32)>,
    reject_all: bool,
    facing_user: Option<bool>,
    frame: Mutex<Option<DynamicImage>>,
    attempts: Mutex<Vec<StreamRequest>>,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

impl ScriptedCamera {
    /// Camera that accepts every request.
    pub fn new() -> Self {
        Self {
            rejected: HashSet::new(),
            reject_all: false,
            facing_user: Some(true),
            frame: Mutex::new(None),
            attempts: Mutex::new(Vec::new()),
            live: AtomicUsize::new(0),
            max_live: AtomicUsize::new(0),
        }
    }

    /// Reject exact requests for these sizes.
    pub fn fail_profiles(mut self, sizes: &[(u32, u32)]) -> Self {
        self.rejected.extend(sizes.iter().copied());
        self
    }

    /// Reject every request.
    pub fn fail_all(mut self) -> Self {
        self.reject_all = true;
        self
    }

    /// Facing mode reported in stream settings.
    pub fn facing_user(mut self, facing_user: Option<bool>) -> Self {
        self.facing_user = facing_user;
        self
    }

    /// Frame served by `grab_frame`; defaults to a gray image of the stream size.
    pub fn with_frame(self, frame: DynamicImage) -> Self {
        *lock(&self.frame) = Some(frame);
        self
    }

    /// Every request seen, in order.
    pub fn attempts(&self) -> Vec<StreamRequest> {
        lock(&self.attempts).clone()
    }

    /// Streams currently open.
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open streams observed.
    pub fn max_live_streams(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    fn resolve(constraint: SizeConstraint, fallback: u32) -> u32 {
        match constraint {
            SizeConstraint::Exact(v) | SizeConstraint::Ideal(v) => v,
            SizeConstraint::Any => fallback,
        }
    }
}

impl Default for ScriptedCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraProvider for ScriptedCamera {
    async fn acquire(&self, request: &StreamRequest) -> CaptureResult<StreamHandle> {
        lock(&self.attempts).push(request.clone());

        let frame_size = lock(&self.frame)
            .as_ref()
            .map(|f| (f.width(), f.height()));
        let (fallback_w, fallback_h) = frame_size.unwrap_or((640, 480));
        let width = Self::resolve(request.width, fallback_w);
        let height = Self::resolve(request.height, fallback_h);

        if self.reject_all || self.rejected.contains(&(width, height)) {
            return Err(CaptureError::camera_failed(format!(
                "overconstrained: {}x{}",
                width, height
            )));
        }

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(StreamHandle::new(
            request.device_id.clone(),
            StreamSettings {
                width,
                height,
                facing_user: self.facing_user,
            },
        ))
    }

    fn release(&self, _handle: StreamHandle) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    async fn grab_frame(&self, handle: &StreamHandle) -> CaptureResult<DynamicImage> {
        if let Some(frame) = lock(&self.frame).as_ref() {
            return Ok(frame.clone());
        }
        let settings = handle.settings();
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            settings.width,
            settings.height,
            image::Rgb([128, 128, 128]),
        )))
    }
}

/// Detector returning a configurable result after an optional delay.
#[derive(Debug)]
pub struct StaticDetector {
    result: Mutex<DetectionResult>,
    failure: Mutex<Option<String>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StaticDetector {
    pub fn new(result: DetectionResult) -> Self {
        Self {
            result: Mutex::new(result),
            failure: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Simulated inference latency.
    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.delay) = delay;
        self
    }

    /// Change the result returned by subsequent calls.
    pub fn set_result(&self, result: DetectionResult) {
        *lock(&self.result) = result;
    }

    /// Make subsequent calls fail with a detection error, or succeed again with `None`.
    pub fn set_failure(&self, message: Option<&str>) {
        *lock(&self.failure) = message.map(str::to_string);
    }

    /// Change the latency of subsequent calls.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = delay;
    }

    /// Number of `detect` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `detect` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceDetector for StaticDetector {
    async fn detect(&self, _image: &DynamicImage) -> CaptureResult<DetectionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Snapshot before sleeping so a result swapped mid-flight does not leak in
        let result = lock(&self.result).clone();
        let failure = lock(&self.failure).clone();
        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match failure {
            Some(message) => Err(CaptureError::detection(message)),
            None => Ok(result),
        }
    }
}

/// Loader that fails a fixed number of times before yielding its detector.
pub struct ScriptedLoader {
    detector: Arc<dyn FaceDetector>,
    failures_left: AtomicUsize,
    loads: AtomicUsize,
}

impl ScriptedLoader {
    pub fn new(detector: Arc<dyn FaceDetector>, failures: usize) -> Self {
        Self {
            detector,
            failures_left: AtomicUsize::new(failures),
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of load attempts so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for ScriptedLoader {
    async fn load(&self) -> CaptureResult<Arc<dyn FaceDetector>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(CaptureError::model_load_failure("model weights unavailable"));
        }
        Ok(self.detector.clone())
    }
}
