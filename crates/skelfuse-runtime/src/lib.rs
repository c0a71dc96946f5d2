//! `skelfuse-runtime` – the frame loop around the fusion core.
//!
//! # Modules
//!
//! - [`calibration`] – [`build_restorer`][calibration::build_restorer]:
//!   loads a rig's [`CalibrationSet`][skelfuse_types::CalibrationSet] and
//!   registers every feed on a fresh restorer.
//! - [`pipeline`] – [`FusionPipeline`][pipeline::FusionPipeline]: screens each
//!   incoming frame, fuses it, and keeps running
//!   [`PipelineStats`][pipeline::PipelineStats].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber, with OTLP span export when
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use skelfuse_types::{FeedId, FusionError};
use thiserror::Error;

pub mod calibration;
pub mod pipeline;
pub mod telemetry;

pub use calibration::{build_restorer, load_calibration};
pub use pipeline::{FusionPipeline, PipelineConfig, PipelineStats};
pub use telemetry::{init_tracing, TracerProviderGuard};

/// Errors surfaced by the runtime layer.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Fusion(#[from] FusionError),

    #[error("Calibration of feed {feed} failed: {source}")]
    Calibration { feed: FeedId, source: FusionError },
}
