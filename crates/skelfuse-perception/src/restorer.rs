//! Skeleton restoration.
//!
//! [`SkeletalRestorer`] owns one [`BasisTranslator`] per registered feed and
//! merges the landmark matrices reported by every feed for a frame into a
//! single skeleton expressed in the base feed's frame.
//!
//! Each landmark index is fused on its own: every feed's point is translated
//! into the base frame and weighted by `visibility × presence`.  When no feed
//! has any confidence in a landmark the plain mean of the translated points is
//! used instead, so the output always has one row per input landmark.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use nalgebra::DMatrix;
//! use skelfuse_perception::restorer::SkeletalRestorer;
//! use skelfuse_types::FeedId;
//!
//! let base = FeedId::new("front");
//! let restorer = SkeletalRestorer::new(base.clone());
//!
//! let mut frame = HashMap::new();
//! frame.insert(base, DMatrix::from_row_slice(1, 5, &[1.0, 2.0, 3.0, 1.0, 1.0]));
//!
//! let skeleton = restorer.fuse(&frame).unwrap();
//! assert_eq!(skeleton[(0, 1)], 2.0);
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use nalgebra::{DMatrix, DVector};
use skelfuse_types::{FeedId, FusionError, DIMENSIONS, SAMPLE_COLUMNS};
use tracing::{debug, info};

use crate::basis::BasisTranslator;
use crate::matrix::all_finite;

const VISIBILITY: usize = 3;
const PRESENCE: usize = 4;

/// Output of [`SkeletalRestorer::fuse_detailed`].
#[derive(Debug, Clone, PartialEq)]
pub struct FusedSkeleton {
    /// n×3 base-frame coordinates, one row per landmark.
    pub points: DMatrix<f64>,
    /// Total confidence weight `Σ visibility × presence` behind each row.
    /// A zero entry marks a row produced by the unweighted fallback.
    pub confidence: DVector<f64>,
}

/// Fuses per-feed landmark matrices into one skeleton in the base frame.
///
/// Registration ([`SkeletalRestorer::register_feed`]) needs `&mut self` and is
/// expected to happen during calibration; fusion only needs `&self`.  Wrap the
/// restorer in a [`SharedRestorer`][crate::shared::SharedRestorer] when the two
/// phases overlap.
#[derive(Debug, Clone)]
pub struct SkeletalRestorer<K = FeedId> {
    base_feed: K,
    base_identity: BasisTranslator,
    translators: HashMap<K, BasisTranslator>,
}

impl<K> SkeletalRestorer<K>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Create a restorer whose output frame is `base_feed`'s frame.
    pub fn new(base_feed: K) -> Self {
        Self {
            base_feed,
            base_identity: BasisTranslator::identity(DIMENSIONS),
            translators: HashMap::new(),
        }
    }

    pub fn base_feed(&self) -> &K {
        &self.base_feed
    }

    /// Fit and store the transform for `feed` from a calibration
    /// correspondence.  `source` holds the points in `feed`'s frame,
    /// `destination` the same points in the base frame.
    ///
    /// Re-registering a feed replaces its transform.  On error the table is
    /// left untouched.
    pub fn register_feed(
        &mut self,
        feed: K,
        source: &DMatrix<f64>,
        destination: &DMatrix<f64>,
    ) -> Result<(), FusionError> {
        let translator = BasisTranslator::register(source, destination)?;
        if translator.dimension() != DIMENSIONS {
            return Err(FusionError::shape(
                format!("{DIMENSIONS}-D calibration points"),
                format!("{}-D calibration points", translator.dimension()),
            ));
        }
        let replaced = self.translators.insert(feed.clone(), translator).is_some();
        info!(feed = ?feed, replaced, "feed registered");
        Ok(())
    }

    /// `true` for the base feed and for every feed with a stored transform.
    pub fn is_registered(&self, feed: &K) -> bool {
        *feed == self.base_feed || self.translators.contains_key(feed)
    }

    /// Feeds with a stored transform (the base feed is listed only if it was
    /// registered explicitly).
    pub fn feeds(&self) -> impl Iterator<Item = &K> {
        self.translators.keys()
    }

    /// Stored transform of `feed`, if any.
    pub fn translator(&self, feed: &K) -> Option<&BasisTranslator> {
        self.translators.get(feed)
    }

    /// Transform used for `feed` during fusion.  A stored entry wins; the base
    /// feed otherwise falls back to identity.
    fn resolve(&self, feed: &K) -> Result<&BasisTranslator, FusionError> {
        match self.translators.get(feed) {
            Some(t) => Ok(t),
            None if *feed == self.base_feed => Ok(&self.base_identity),
            None => Err(FusionError::UnknownFeed(format!("{feed:?}"))),
        }
    }

    /// Fuse one frame and return only the n×3 coordinates.
    pub fn fuse(&self, landmarks_by_feed: &HashMap<K, DMatrix<f64>>) -> Result<DMatrix<f64>, FusionError> {
        self.fuse_detailed(landmarks_by_feed).map(|s| s.points)
    }

    /// Fuse one frame.
    ///
    /// `landmarks_by_feed` maps each feed to an n×5 matrix with columns
    /// `x, y, z, visibility, presence`; every feed must report the same n.
    ///
    /// # Errors
    ///
    /// Checked in this order, each across all feeds:
    ///
    /// 1. [`FusionError::NoInput`] when no feed is supplied.
    /// 2. [`FusionError::ShapeMismatch`] when a matrix is not 5 columns wide.
    /// 3. [`FusionError::NonFinite`] when a matrix holds NaN or infinity.
    /// 4. [`FusionError::UnknownFeed`] when a feed has no transform.
    /// 5. [`FusionError::ShapeMismatch`] when the feeds disagree on the
    ///    landmark count.
    ///
    /// All inputs are validated before any arithmetic, so an error never comes
    /// with a partial result.
    pub fn fuse_detailed(
        &self,
        landmarks_by_feed: &HashMap<K, DMatrix<f64>>,
    ) -> Result<FusedSkeleton, FusionError> {
        if landmarks_by_feed.is_empty() {
            return Err(FusionError::NoInput);
        }

        // Each check runs over every feed before the next one starts, so the
        // error kind does not depend on map iteration order.
        if let Some((feed, samples)) = landmarks_by_feed
            .iter()
            .find(|(_, samples)| samples.ncols() != SAMPLE_COLUMNS)
        {
            return Err(FusionError::shape(
                format!("{SAMPLE_COLUMNS} columns"),
                format!("{} columns from feed {feed:?}", samples.ncols()),
            ));
        }
        if let Some((feed, _)) = landmarks_by_feed.iter().find(|(_, samples)| !all_finite(samples)) {
            return Err(FusionError::NonFinite(format!("landmarks of feed {feed:?}")));
        }
        let contributions = landmarks_by_feed
            .iter()
            .map(|(feed, samples)| Ok((feed, self.resolve(feed)?, samples)))
            .collect::<Result<Vec<_>, FusionError>>()?;

        let n = contributions[0].2.nrows();
        if let Some((feed, _, samples)) = contributions.iter().find(|(_, _, s)| s.nrows() != n) {
            return Err(FusionError::shape(
                format!("{n} landmarks"),
                format!("{} landmarks from feed {feed:?}", samples.nrows()),
            ));
        }

        let mut weighted = DMatrix::<f64>::zeros(n, DIMENSIONS);
        let mut unweighted = DMatrix::<f64>::zeros(n, DIMENSIONS);
        let mut confidence = DVector::<f64>::zeros(n);

        for (_, translator, samples) in &contributions {
            let translated = translator.translate(&samples.columns(0, DIMENSIONS).into_owned())?;
            for i in 0..n {
                let w = (samples[(i, VISIBILITY)] * samples[(i, PRESENCE)]).max(0.0);
                confidence[i] += w;
                for j in 0..DIMENSIONS {
                    weighted[(i, j)] += w * translated[(i, j)];
                    unweighted[(i, j)] += translated[(i, j)];
                }
            }
        }

        let feed_count = contributions.len() as f64;
        let points = DMatrix::from_fn(n, DIMENSIONS, |i, j| {
            if confidence[i] > 0.0 {
                weighted[(i, j)] / confidence[i]
            } else {
                unweighted[(i, j)] / feed_count
            }
        });

        let fallback = confidence.iter().filter(|w| **w <= 0.0).count();
        debug!(feeds = contributions.len(), landmarks = n, fallback, "fused skeleton");

        Ok(FusedSkeleton { points, confidence })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
