//! Face detector and model loader capabilities.
//!
//! The detection model is an external collaborator. The pipeline only needs
//! something it can hand a frame to and get a [`DetectionResult`] back.

use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use tokio::sync::RwLock;
use tracing::{info, warn};

use facecap_models::DetectionResult;

use crate::error::{CaptureError, CaptureResult};

/// Face detection provider.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a frame. An empty result means no face.
    async fn detect(&self, image: &DynamicImage) -> CaptureResult<DetectionResult>;
}

/// Loads detector weights out of band.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the model and return a ready detector.
    async fn load(&self) -> CaptureResult<Arc<dyn FaceDetector>>;
}

/// Detector that becomes usable once its loader has succeeded.
///
/// Calls made before loading completes fail with `ModelLoadFailure`.
pub struct LazyDetector {
    loader: Arc<dyn ModelLoader>,
    loaded: RwLock<Option<Arc<dyn FaceDetector>>>,
}

impl LazyDetector {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            loaded: RwLock::new(None),
        }
    }

    /// Whether the model has been loaded.
    pub async fn is_loaded(&self) -> bool {
        self.loaded.read().await.is_some()
    }

    /// Load the model unless already loaded. Safe to call again after a failure.
    pub async fn ensure_loaded(&self) -> CaptureResult<()> {
        if self.is_loaded().await {
            return Ok(());
        }

        let mut slot = self.loaded.write().await;
        if slot.is_some() {
            return Ok(());
        }
        match self.loader.load().await {
            Ok(detector) => {
                info!("Face detection model loaded");
                *slot = Some(detector);
                Ok(())
            }
            Err(e) => {
                warn!("Face detection model failed to load: {}", e);
                Err(match e {
                    CaptureError::ModelLoadFailure(_) => e,
                    other => CaptureError::model_load_failure(other.to_string()),
                })
            }
        }
    }
}

#[async_trait]
impl FaceDetector for LazyDetector {
    async fn detect(&self, image: &DynamicImage) -> CaptureResult<DetectionResult> {
        let detector = self.loaded.read().await.clone();
        match detector {
            Some(detector) => detector.detect(image).await,
            None => Err(CaptureError::model_load_failure("model not loaded yet")),
        }
    }
}
