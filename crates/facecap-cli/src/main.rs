//! FaceCap command-line driver.
//!
//! Runs guidance classification and crop/encode on still images and
//! detector output stored as JSON.

mod args;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use facecap_media::testing::{ScriptedCamera, StaticDetector};
use facecap_media::{
    CaptureConfig, CaptureOutcome, CapturePipeline, CapturedPhoto, CropGeometryEngine,
    FaceGuidanceClassifier, PhotoEncoder,
};
use facecap_models::{ConstraintProfile, CropMode, CropRequest, DetectionResult, DEFAULT_PROFILES};

use args::{Command, ModeArg, USAGE};

/// How long an offline capture waits for the first guidance sample.
const FIRST_GUIDANCE_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let command = args::parse(std::env::args().skip(1))?;
    let config = CaptureConfig::from_env();
    config.validate()?;
    debug!(?config, "Loaded capture config");

    match command {
        Command::Classify {
            detections,
            frame_width,
            frame_height,
        } => classify(&config, &detections, frame_width, frame_height),
        Command::Crop {
            image,
            detections,
            mode,
            factor,
            clamp,
            out,
        } => {
            let mut config = config;
            if let Some(factor) = factor {
                config.padding_factor = factor;
            }
            config.clamp_id_origin |= clamp;
            config.validate()?;
            crop(&config, &image, &detections, mode, out)
        }
        Command::Capture {
            image,
            detections,
            mode,
            out,
        } => capture(config, &image, &detections, mode, out).await,
        Command::Profiles { preference } => {
            let preference = preference.unwrap_or(config.profile_preference);
            for profile in preference.order(&DEFAULT_PROFILES) {
                println!("{}", profile);
            }
            Ok(())
        }
        Command::Schema => {
            let schema = schemars::schema_for!(DetectionResult);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        }
    }
}

fn init_tracing() -> Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("facecap=info".parse()?);

    // Logs go to stderr; stdout carries command output
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

fn read_detections(path: &Path) -> Result<DetectionResult> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid detection JSON in {}", path.display()))
}

fn crop_mode(config: &CaptureConfig, mode: ModeArg) -> CropMode {
    match mode {
        ModeArg::Selfie => config.selfie_mode(),
        ModeArg::Id => config.id_photo_mode(),
    }
}

fn output_path(image: &Path, out: Option<PathBuf>, config: &CaptureConfig) -> PathBuf {
    out.unwrap_or_else(|| image.with_extension(format!("crop.{}", config.encode.format.extension())))
}

fn write_photo(photo: &CapturedPhoto, path: &Path) -> Result<()> {
    std::fs::write(path, &photo.data)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(
        path = %path.display(),
        width = photo.width,
        height = photo.height,
        bytes = photo.size(),
        "Wrote photo"
    );
    println!("{}", path.display());
    Ok(())
}

fn classify(config: &CaptureConfig, detections: &Path, width: u32, height: u32) -> Result<()> {
    let detection = read_detections(detections)?;
    let state = FaceGuidanceClassifier::new(config.guidance).classify(&detection, width, height);
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

fn crop(
    config: &CaptureConfig,
    image: &Path,
    detections: &Path,
    mode: ModeArg,
    out: Option<PathBuf>,
) -> Result<()> {
    let frame = image::open(image).with_context(|| format!("failed to open {}", image.display()))?;
    let detection = read_detections(detections)?;
    let Some(face) = detection.primary() else {
        bail!("no face in {}", detections.display());
    };

    let request = CropRequest::new(frame.width(), frame.height(), face.bbox, crop_mode(config, mode));
    let rect = CropGeometryEngine::new().compute(&request)?;
    info!(
        mode = request.mode.name(),
        x = rect.x,
        y = rect.y,
        width = rect.width,
        height = rect.height,
        "Computed crop"
    );

    // Still images carry no facing mode, so they are never mirrored
    let photo = PhotoEncoder::new(config.encode, config.mirror).encode(&frame, &rect, None)?;
    write_photo(&photo, &output_path(image, out, config))
}

/// Replay a still image through the live pipeline.
async fn capture(
    config: CaptureConfig,
    image: &Path,
    detections: &Path,
    mode: ModeArg,
    out: Option<PathBuf>,
) -> Result<()> {
    let frame = image::open(image).with_context(|| format!("failed to open {}", image.display()))?;
    let detection = read_detections(detections)?;
    let profile = ConstraintProfile::new(frame.width(), frame.height());

    let camera = Arc::new(ScriptedCamera::new().facing_user(None).with_frame(frame));
    let detector = Arc::new(StaticDetector::new(detection));
    let mode = crop_mode(&config, mode);
    let out = output_path(image, out, &config);

    let pipeline = CapturePipeline::new(camera, detector, config)?;
    let mut guidance = pipeline.subscribe();
    pipeline.start("file", &[profile]).await?;

    let shown = tokio::time::timeout(FIRST_GUIDANCE_TIMEOUT, guidance.wait_for(Option::is_some))
        .await
        .context("timed out waiting for guidance")??
        .clone();
    if let Some(state) = &shown {
        println!("{}", serde_json::to_string_pretty(state)?);
    }

    match pipeline.capture(mode).await? {
        CaptureOutcome::Captured(photo) => write_photo(&photo, &out),
        CaptureOutcome::Ignored => {
            let message = shown
                .and_then(|s| s.message)
                .unwrap_or_else(|| "framing not ready".to_string());
            bail!("capture not taken: {}", message)
        }
    }
}
