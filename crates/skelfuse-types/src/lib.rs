//! `skelfuse-types` – shared vocabulary of the skeleton fusion stack.
//!
//! Every crate in the workspace speaks in these types: feed identifiers,
//! per-landmark samples, the calibration and per-frame wire records, and the
//! [`FusionError`] returned by registration and fusion.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of spatial coordinates per landmark.
pub const DIMENSIONS: usize = 3;

/// Columns of a landmark matrix row: x, y, z, visibility, presence.
pub const SAMPLE_COLUMNS: usize = 5;

/// Opaque identifier of one camera / landmark source.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FeedId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One landmark as reported by one feed for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LandmarkSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Likelihood that the landmark is visible (not occluded), in `[0, 1]`.
    pub visibility: f64,
    /// Likelihood that the landmark is present in the frame, in `[0, 1]`.
    pub presence: f64,
}

impl LandmarkSample {
    pub fn new(x: f64, y: f64, z: f64, visibility: f64, presence: f64) -> Self {
        Self {
            x,
            y,
            z,
            visibility,
            presence,
        }
    }

    /// Fusion weight of this sample: `visibility * presence`, never negative.
    pub fn weight(&self) -> f64 {
        (self.visibility * self.presence).max(0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.to_row().iter().all(|v| v.is_finite())
    }

    pub fn to_row(&self) -> [f64; SAMPLE_COLUMNS] {
        [self.x, self.y, self.z, self.visibility, self.presence]
    }
}

/// Point correspondence for one feed, captured by an external calibration
/// procedure.  Row `i` of `source` (feed frame) matches row `i` of
/// `destination` (base frame).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeedCalibration {
    pub feed: FeedId,
    pub source: Vec<[f64; DIMENSIONS]>,
    pub destination: Vec<[f64; DIMENSIONS]>,
}

/// Calibration of a whole rig: the base feed plus one correspondence per
/// additional feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CalibrationSet {
    pub base_feed: FeedId,
    #[serde(default)]
    pub feeds: Vec<FeedCalibration>,
}

/// Synchronised landmark samples from every active feed for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameInput {
    pub frame: u64,
    pub feeds: BTreeMap<FeedId, Vec<LandmarkSample>>,
}

/// Fused skeleton for one frame, expressed in the base feed's frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedFrame {
    pub frame: u64,
    pub fused_at: DateTime<Utc>,
    pub landmarks: Vec<[f64; DIMENSIONS]>,
    /// Total confidence weight behind each landmark.  Zero means the point is
    /// the unweighted mean of all feeds.
    pub confidence: Vec<f64>,
}

/// Failures of basis registration and skeleton fusion.
///
/// Every variant is a precondition violation; none is retried internally.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FusionError {
    #[error("Shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Unknown feed: {0}")]
    UnknownFeed(String),

    #[error("No input feeds supplied")]
    NoInput,

    #[error("Non-finite value in {0}")]
    NonFinite(String),
}

impl FusionError {
    pub fn shape(expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_id_serializes_as_plain_string() {
        let id = FeedId::new("cam_left");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cam_left\"");
        assert_eq!(id.to_string(), "cam_left");
    }

    #[test]
    fn sample_weight_is_product_of_confidences() {
        let s = LandmarkSample::new(0.0, 0.0, 0.0, 0.5, 0.8);
        assert!((s.weight() - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn sample_weight_never_negative() {
        let s = LandmarkSample::new(0.0, 0.0, 0.0, -0.5, 0.8);
        assert_eq!(s.weight(), 0.0);
    }

    #[test]
    fn sample_is_finite_detects_nan() {
        assert!(LandmarkSample::new(1.0, 2.0, 3.0, 1.0, 1.0).is_finite());
        assert!(!LandmarkSample::new(f64::NAN, 2.0, 3.0, 1.0, 1.0).is_finite());
        assert!(!LandmarkSample::new(1.0, 2.0, 3.0, f64::INFINITY, 1.0).is_finite());
    }

    #[test]
    fn frame_input_parses_feed_keyed_map() {
        let raw = r#"{
            "frame": 7,
            "feeds": {
                "base": [{"x": 1.0, "y": 2.0, "z": 3.0, "visibility": 0.9, "presence": 1.0}],
                "side": [{"x": 0.0, "y": 1.0, "z": 3.0, "visibility": 0.1, "presence": 0.5}]
            }
        }"#;
        let frame: FrameInput = serde_json::from_str(raw).unwrap();
        assert_eq!(frame.frame, 7);
        assert_eq!(frame.feeds.len(), 2);
        assert_eq!(frame.feeds[&FeedId::new("side")][0].y, 1.0);
    }

    #[test]
    fn calibration_set_feeds_default_to_empty() {
        let set: CalibrationSet = serde_json::from_str(r#"{"base_feed": "front"}"#).unwrap();
        assert_eq!(set.base_feed, FeedId::new("front"));
        assert!(set.feeds.is_empty());
    }

    #[test]
    fn fusion_error_display() {
        let err = FusionError::UnknownFeed("cam_9".to_string());
        assert!(err.to_string().contains("cam_9"));

        let err = FusionError::shape("3 columns", "4 columns");
        assert!(err.to_string().contains("expected 3 columns"));
    }

    #[test]
    fn fusion_error_roundtrip() {
        let err = FusionError::DegenerateInput("zero spread".to_string());
        let json = serde_json::to_string(&err).unwrap();
        let back: FusionError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
