//! Capture metrics.
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! these calls are no-ops.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const NEGOTIATION_ATTEMPTS_TOTAL: &str = "facecap_negotiation_attempts_total";
    pub const NEGOTIATION_FAILURES_TOTAL: &str = "facecap_negotiation_failures_total";
    pub const SAMPLES_TOTAL: &str = "facecap_samples_total";
    pub const SAMPLES_SKIPPED_TOTAL: &str = "facecap_samples_skipped_total";
    pub const GUIDANCE_TOTAL: &str = "facecap_guidance_total";
    pub const DETECTION_DURATION_SECONDS: &str = "facecap_detection_duration_seconds";
    pub const CAPTURES_TOTAL: &str = "facecap_captures_total";
}

/// Record one acquisition attempt for a profile.
pub fn record_negotiation_attempt(profile: &str, success: bool) {
    let labels = [
        ("profile", profile.to_string()),
        ("success", success.to_string()),
    ];
    counter!(names::NEGOTIATION_ATTEMPTS_TOTAL, &labels).increment(1);
}

/// Record a negotiation that exhausted every profile.
pub fn record_negotiation_failure() {
    counter!(names::NEGOTIATION_FAILURES_TOTAL).increment(1);
}

/// Record a guidance sample that ran a detection.
pub fn record_sample(duration_secs: f64) {
    counter!(names::SAMPLES_TOTAL).increment(1);
    histogram!(names::DETECTION_DURATION_SECONDS).record(duration_secs);
}

/// Record a tick skipped because a detection was still in flight.
pub fn record_sample_skipped() {
    counter!(names::SAMPLES_SKIPPED_TOTAL).increment(1);
}

/// Record a classified guidance state.
pub fn record_guidance(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::GUIDANCE_TOTAL, &labels).increment(1);
}

/// Record a capture attempt outcome.
pub fn record_capture(mode: &str, outcome: &str) {
    let labels = [("mode", mode.to_string()), ("outcome", outcome.to_string())];
    counter!(names::CAPTURES_TOTAL, &labels).increment(1);
}
