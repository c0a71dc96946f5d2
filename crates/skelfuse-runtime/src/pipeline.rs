//! [`FusionPipeline`] – caller-side frame loop.
//!
//! Sits between the perception feed and the [`SharedRestorer`]: it screens
//! each [`FrameInput`], converts the surviving feeds to landmark matrices,
//! fuses them and stamps the result.  Everything runs on the caller's thread;
//! the pipeline never spawns work of its own.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use skelfuse_perception::SkeletalRestorer;
//! use skelfuse_runtime::pipeline::{FusionPipeline, PipelineConfig};
//! use skelfuse_types::{FeedId, FrameInput, LandmarkSample};
//!
//! let restorer = SkeletalRestorer::new(FeedId::new("front"));
//! let mut pipeline = FusionPipeline::new(restorer, PipelineConfig::default());
//!
//! let mut feeds = BTreeMap::new();
//! feeds.insert(FeedId::new("front"), vec![LandmarkSample::new(0.1, 1.5, 2.0, 0.9, 1.0)]);
//! let fused = pipeline.process(&FrameInput { frame: 1, feeds }).unwrap();
//!
//! assert_eq!(fused.landmarks, vec![[0.1, 1.5, 2.0]]);
//! assert_eq!(pipeline.stats().frames_fused, 1);
//! ```

use std::collections::HashMap;
use std::io::{BufRead, Write};

use chrono::Utc;
use serde::Serialize;
use skelfuse_perception::matrix::{matrix_to_rows, samples_to_matrix};
use skelfuse_perception::SharedRestorer;
use skelfuse_types::{FeedId, FrameInput, FusedFrame};
use tracing::{debug, info, info_span, warn};

use crate::PipelineError;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Behaviour switches for [`FusionPipeline`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Drop feeds without a registered transform instead of failing the
    /// whole frame with `UnknownFeed`.
    pub skip_unknown_feeds: bool,
    /// Stop [`FusionPipeline::run`] at the first bad line instead of logging
    /// it and moving on.
    pub strict: bool,
}

/// Running counters of a [`FusionPipeline`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames_fused: u64,
    pub frames_failed: u64,
    pub feeds_dropped: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// FusionPipeline
// ─────────────────────────────────────────────────────────────────────────────

pub struct FusionPipeline {
    restorer: SharedRestorer<FeedId>,
    config: PipelineConfig,
    stats: PipelineStats,
}

impl FusionPipeline {
    pub fn new(restorer: impl Into<SharedRestorer<FeedId>>, config: PipelineConfig) -> Self {
        Self {
            restorer: restorer.into(),
            config,
            stats: PipelineStats::default(),
        }
    }

    /// Handle to the underlying restorer, e.g. to register a late feed.
    pub fn restorer(&self) -> &SharedRestorer<FeedId> {
        &self.restorer
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Screen, fuse, and stamp one frame.
    ///
    /// Feeds carrying a non-finite sample are dropped with a warning, as are
    /// unregistered feeds when `skip_unknown_feeds` is set.  A frame left with
    /// no feeds fails with `NoInput`.
    pub fn process(&mut self, input: &FrameInput) -> Result<FusedFrame, PipelineError> {
        let span = info_span!("frame", frame = input.frame);
        let _enter = span.enter();

        let mut batch = HashMap::with_capacity(input.feeds.len());
        for (feed, samples) in &input.feeds {
            if let Some(landmark) = samples.iter().position(|s| !s.is_finite()) {
                warn!(feed = %feed, landmark, "dropping feed with non-finite sample");
                self.stats.feeds_dropped += 1;
                continue;
            }
            if self.config.skip_unknown_feeds && !self.restorer.is_registered(feed) {
                warn!(feed = %feed, "dropping unregistered feed");
                self.stats.feeds_dropped += 1;
                continue;
            }
            batch.insert(feed.clone(), samples_to_matrix(samples));
        }

        match self.restorer.fuse_detailed(&batch) {
            Ok(skeleton) => {
                self.stats.frames_fused += 1;
                debug!(feeds = batch.len(), "frame fused");
                Ok(FusedFrame {
                    frame: input.frame,
                    fused_at: Utc::now(),
                    landmarks: matrix_to_rows(&skeleton.points),
                    confidence: skeleton.confidence.iter().copied().collect(),
                })
            }
            Err(e) => {
                self.stats.frames_failed += 1;
                warn!(error = %e, "frame fusion failed");
                Err(e.into())
            }
        }
    }

    /// Fuse a JSON-lines stream of [`FrameInput`] into a JSON-lines stream of
    /// [`FusedFrame`].
    ///
    /// Blank lines are skipped.  Unparseable or unfusable lines are logged and
    /// skipped, or returned as the error when `strict` is set.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        reader: R,
        mut writer: W,
    ) -> Result<PipelineStats, PipelineError> {
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|e| PipelineError::Io {
                path: "input".to_string(),
                source: e,
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let frame = match serde_json::from_str::<FrameInput>(&line) {
                Ok(frame) => frame,
                Err(e) => {
                    self.stats.frames_failed += 1;
                    if self.config.strict {
                        return Err(e.into());
                    }
                    warn!(line = line_no, error = %e, "skipping malformed line");
                    continue;
                }
            };

            match self.process(&frame) {
                Ok(frame) => {
                    serde_json::to_writer(&mut writer, &frame)?;
                    writeln!(writer).map_err(|e| PipelineError::Io {
                        path: "output".to_string(),
                        source: e,
                    })?;
                }
                Err(e) if self.config.strict => return Err(e),
                Err(e) => warn!(line = line_no, error = %e, "skipping frame"),
            }
        }

        writer.flush().map_err(|e| PipelineError::Io {
            path: "output".to_string(),
            source: e,
        })?;

        info!(
            fused = self.stats.frames_fused,
            failed = self.stats.frames_failed,
            dropped_feeds = self.stats.feeds_dropped,
            "stream finished"
        );
        Ok(self.stats)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
