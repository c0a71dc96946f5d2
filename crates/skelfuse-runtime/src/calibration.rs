//! Rig calibration loading.
//!
//! A [`CalibrationSet`] names the base feed and carries one point
//! correspondence per additional feed.  [`build_restorer`] turns it into a
//! ready-to-fuse [`SkeletalRestorer`].  Calibration files are only ever read
//! here; producing them is the calibration procedure's job.

use std::fs;
use std::path::Path;

use skelfuse_perception::matrix::points_from_rows;
use skelfuse_perception::SkeletalRestorer;
use skelfuse_types::{CalibrationSet, FeedId};
use tracing::info;

use crate::PipelineError;

/// Register every feed of `set` on a fresh restorer.
///
/// Fails on the first feed whose correspondence cannot be registered; the
/// error names that feed.
pub fn build_restorer(set: &CalibrationSet) -> Result<SkeletalRestorer<FeedId>, PipelineError> {
    let mut restorer = SkeletalRestorer::new(set.base_feed.clone());
    for entry in &set.feeds {
        let source = points_from_rows(&entry.source);
        let destination = points_from_rows(&entry.destination);
        restorer
            .register_feed(entry.feed.clone(), &source, &destination)
            .map_err(|source| PipelineError::Calibration {
                feed: entry.feed.clone(),
                source,
            })?;
    }
    info!(
        base_feed = %set.base_feed,
        feeds = set.feeds.len(),
        "calibration applied"
    );
    Ok(restorer)
}

/// Read a JSON [`CalibrationSet`] from `path`.
pub fn load_calibration(path: &Path) -> Result<CalibrationSet, PipelineError> {
    let raw = fs::read_to_string(path).map_err(|e| PipelineError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let set = serde_json::from_str(&raw)?;
    Ok(set)
}
