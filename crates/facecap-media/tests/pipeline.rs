//! End-to-end capture pipeline tests over scripted collaborators.
//!
//! Time is paused, so the sampling timer advances only as the tests sleep.

use std::sync::Arc;
use std::time::Duration;

use facecap_media::testing::{ScriptedCamera, StaticDetector};
use facecap_media::{
    CaptureConfig, CaptureError, CaptureOutcome, CapturePipeline, PipelineState,
};
use facecap_models::{
    BoundingBox, ConstraintProfile, DetectedFace, DetectionResult, GuidanceKind, GuidanceState,
    Keypoint, Keypoints, ProfilePreference, Resolution,
};
use tokio::sync::watch;

const VGA: [ConstraintProfile; 1] = [ConstraintProfile::new(640, 480)];

fn face(x: f64, y: f64, w: f64, h: f64) -> DetectionResult {
    DetectionResult::single(
        DetectedFace::new(BoundingBox::new(x, y, w, h))
            .with_gesture("facing center")
            .with_gesture("mouth 0% open")
            .with_keypoints(Keypoints {
                left_eye: Some(Keypoint::new(0.95)),
                right_eye: Some(Keypoint::new(0.95)),
                ..Default::default()
            }),
    )
}

/// ~0.26 of a 640x480 frame.
fn ready_face() -> DetectionResult {
    face(180.0, 100.0, 280.0, 280.0)
}

/// ~0.13 of a 640x480 frame.
fn distant_face() -> DetectionResult {
    face(100.0, 100.0, 200.0, 200.0)
}

fn setup(
    result: DetectionResult,
    config: CaptureConfig,
) -> (CapturePipeline, Arc<ScriptedCamera>, Arc<StaticDetector>) {
    let camera = Arc::new(ScriptedCamera::new());
    let detector = Arc::new(StaticDetector::new(result));
    let pipeline = CapturePipeline::new(camera.clone(), detector.clone(), config).unwrap();
    (pipeline, camera, detector)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(600)).await;
}

/// Wait for the displayed guidance to satisfy `pred`, failing after 5 s.
async fn shown_until(
    rx: &mut watch::Receiver<Option<GuidanceState>>,
    pred: impl FnMut(&Option<GuidanceState>) -> bool,
) -> Option<GuidanceState> {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("guidance did not arrive in time")
        .unwrap()
        .clone()
}

#[tokio::test(start_paused = true)]
async fn capture_while_too_far_does_nothing() {
    let (pipeline, camera, _detector) = setup(distant_face(), CaptureConfig::default());
    pipeline.start("cam0", &VGA).await.unwrap();
    settle().await;

    let shown = pipeline.guidance().unwrap();
    assert_eq!(shown.kind, GuidanceKind::TooFar);
    assert_eq!(shown.message.as_deref(), Some("Too far"));

    let outcome = pipeline.capture_selfie().await.unwrap();
    assert_eq!(outcome, CaptureOutcome::Ignored);
    assert_eq!(pipeline.state(), PipelineState::Live);
    assert!(pipeline.last_capture().is_none());
    assert_eq!(camera.live_streams(), 1);
}

#[tokio::test(start_paused = true)]
async fn capture_when_ready_completes_and_releases_camera() {
    let (pipeline, camera, detector) = setup(ready_face(), CaptureConfig::default());
    let device = pipeline.start("cam0", &VGA).await.unwrap();
    assert_eq!(
        device.capture_resolution,
        Some(Resolution {
            width: 640,
            height: 480
        })
    );
    settle().await;
    assert!(pipeline.guidance().unwrap().is_ready());

    let photo = match pipeline.capture_selfie().await.unwrap() {
        CaptureOutcome::Captured(photo) => photo,
        other => panic!("expected a capture, got {:?}", other),
    };
    // pad 70: (110, 0) to (530, 480)
    assert_eq!((photo.width, photo.height), (420, 480));
    assert_eq!(photo.mime_type(), "image/jpeg");
    assert!(photo.to_data_url().starts_with("data:image/jpeg;base64,"));

    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(pipeline.last_capture(), Some(photo));
    assert_eq!(camera.live_streams(), 0);
    assert!(pipeline.device_info().is_none());

    // Timer stopped
    let calls = detector.calls();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(detector.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn failed_capture_keeps_previous_photo() {
    let (pipeline, camera, detector) = setup(ready_face(), CaptureConfig::default());
    pipeline.start("cam0", &VGA).await.unwrap();
    settle().await;
    let first = match pipeline.capture_selfie().await.unwrap() {
        CaptureOutcome::Captured(photo) => photo,
        other => panic!("expected a capture, got {:?}", other),
    };

    // Start over from Done
    pipeline.start("cam0", &VGA).await.unwrap();
    settle().await;
    assert!(pipeline.guidance().unwrap().is_ready());

    // Face gone by the time the shutter fires
    detector.set_result(DetectionResult::empty());
    let err = pipeline.capture_selfie().await.unwrap_err();
    assert!(matches!(err, CaptureError::NoFaceDetected));

    assert_eq!(pipeline.state(), PipelineState::Live);
    assert_eq!(pipeline.last_capture(), Some(first));
    assert_eq!(camera.live_streams(), 1);
}

#[tokio::test(start_paused = true)]
async fn id_crop_above_frame_is_rejected_unless_clamped() {
    // High in the frame: the ID frame's top edge lands at -180
    let high_face = face(190.0, 10.0, 260.0, 260.0);

    let (pipeline, _camera, _detector) = setup(high_face.clone(), CaptureConfig::default());
    pipeline.start("cam0", &VGA).await.unwrap();
    settle().await;
    assert!(pipeline.guidance().unwrap().is_ready());

    let err = pipeline.capture_id_photo().await.unwrap_err();
    match err {
        CaptureError::CropBoundsInvalid { y, .. } => assert_eq!(y, -180.0),
        other => panic!("expected CropBoundsInvalid, got {:?}", other),
    }
    assert_eq!(pipeline.state(), PipelineState::Live);

    let config = CaptureConfig {
        clamp_id_origin: true,
        ..Default::default()
    };
    let (pipeline, _camera, _detector) = setup(high_face, config);
    pipeline.start("cam0", &VGA).await.unwrap();
    settle().await;

    match pipeline.capture_id_photo().await.unwrap() {
        CaptureOutcome::Captured(photo) => {
            assert_eq!(photo.crop.y, 0.0);
            assert_eq!(photo.height, 480);
        }
        other => panic!("expected a capture, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn slow_detections_never_overlap() {
    let (pipeline, _camera, detector) = setup(ready_face(), CaptureConfig::default());
    detector.set_delay(Duration::from_millis(1200));
    pipeline.start("cam0", &VGA).await.unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(detector.max_in_flight(), 1);
    // Six ticks elapsed but at most one detection per 1.2 s
    assert!(detector.calls() >= 1);
    assert!(detector.calls() <= 3);
}

#[tokio::test(start_paused = true)]
async fn capture_never_overlaps_a_guidance_sample() {
    let (pipeline, _camera, detector) = setup(ready_face(), CaptureConfig::default());
    pipeline.start("cam0", &VGA).await.unwrap();
    settle().await;
    assert!(pipeline.guidance().unwrap().is_ready());

    // The tick at 1000 ms starts a 400 ms detection; capture lands inside it
    detector.set_delay(Duration::from_millis(400));
    tokio::time::sleep(Duration::from_millis(450)).await;

    let outcome = pipeline.capture_selfie().await.unwrap();
    assert!(matches!(outcome, CaptureOutcome::Captured(_)));
    assert_eq!(detector.max_in_flight(), 1);
    assert_eq!(pipeline.state(), PipelineState::Done);
}

#[tokio::test(start_paused = true)]
async fn reset_stops_sampling_and_releases_camera() {
    let (pipeline, camera, detector) = setup(ready_face(), CaptureConfig::default());
    pipeline.start("cam0", &VGA).await.unwrap();
    settle().await;
    assert!(pipeline.guidance().is_some());

    pipeline.reset().await;
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert!(pipeline.guidance().is_none());
    assert_eq!(camera.live_streams(), 0);

    let calls = detector.calls();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(detector.calls(), calls);

    // Capture after teardown is a no-op
    assert_eq!(
        pipeline.capture_selfie().await.unwrap(),
        CaptureOutcome::Ignored
    );
}

#[tokio::test(start_paused = true)]
async fn dropping_the_pipeline_releases_camera() {
    let (pipeline, camera, _detector) = setup(ready_face(), CaptureConfig::default());
    pipeline.start("cam0", &VGA).await.unwrap();
    settle().await;
    assert_eq!(camera.live_streams(), 1);

    drop(pipeline);
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn negotiation_walks_profiles_in_configured_order() {
    let camera = Arc::new(
        ScriptedCamera::new().fail_profiles(&[(320, 180), (320, 240), (640, 360)]),
    );
    let detector = Arc::new(StaticDetector::new(ready_face()));
    let config = CaptureConfig {
        profile_preference: ProfilePreference::LowestFirst,
        ..Default::default()
    };
    let pipeline = CapturePipeline::new(camera.clone(), detector, config).unwrap();

    let device = pipeline.start_default("cam0").await.unwrap();
    assert_eq!(
        device.capture_resolution,
        Some(Resolution {
            width: 640,
            height: 480
        })
    );
    assert_eq!(camera.attempts().len(), 4);
    assert_eq!(camera.max_live_streams(), 1);
    assert_eq!(pipeline.device_info(), Some(device));
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_guidance_changes() {
    let (pipeline, _camera, detector) = setup(distant_face(), CaptureConfig::default());
    let mut rx = pipeline.subscribe();
    pipeline.start("cam0", &VGA).await.unwrap();

    let first = shown_until(&mut rx, Option::is_some).await.unwrap();
    assert_eq!(first.kind, GuidanceKind::TooFar);

    detector.set_result(ready_face());
    shown_until(&mut rx, |shown| shown.as_ref().is_some_and(|s| s.is_ready())).await;
    assert_eq!(pipeline.guidance().unwrap().message.as_deref(), Some("Perfect!"));
}
