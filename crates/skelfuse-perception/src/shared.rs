//! Thread-safe handle around a [`SkeletalRestorer`].
//!
//! Registration takes the write lock; fusion only takes the read lock, so any
//! number of frames can be fused concurrently while no calibration is in
//! progress.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use nalgebra::DMatrix;
use parking_lot::RwLock;
use skelfuse_types::{FeedId, FusionError};

use crate::restorer::{FusedSkeleton, SkeletalRestorer};

/// Cloneable, lock-protected [`SkeletalRestorer`].
#[derive(Debug)]
pub struct SharedRestorer<K = FeedId> {
    inner: Arc<RwLock<SkeletalRestorer<K>>>,
}

impl<K> Clone for SharedRestorer<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> From<SkeletalRestorer<K>> for SharedRestorer<K> {
    fn from(restorer: SkeletalRestorer<K>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(restorer)),
        }
    }
}

impl<K> SharedRestorer<K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new(base_feed: K) -> Self {
        SkeletalRestorer::new(base_feed).into()
    }

    /// See [`SkeletalRestorer::register_feed`].
    pub fn register_feed(
        &self,
        feed: K,
        source: &DMatrix<f64>,
        destination: &DMatrix<f64>,
    ) -> Result<(), FusionError> {
        self.inner.write().register_feed(feed, source, destination)
    }

    pub fn is_registered(&self, feed: &K) -> bool {
        self.inner.read().is_registered(feed)
    }

    pub fn base_feed(&self) -> K {
        self.inner.read().base_feed().clone()
    }

    /// See [`SkeletalRestorer::fuse`].
    pub fn fuse(&self, landmarks_by_feed: &HashMap<K, DMatrix<f64>>) -> Result<DMatrix<f64>, FusionError> {
        self.inner.read().fuse(landmarks_by_feed)
    }

    /// See [`SkeletalRestorer::fuse_detailed`].
    pub fn fuse_detailed(
        &self,
        landmarks_by_feed: &HashMap<K, DMatrix<f64>>,
    ) -> Result<FusedSkeleton, FusionError> {
        self.inner.read().fuse_detailed(landmarks_by_feed)
    }

    /// Run `f` against a consistent snapshot of the restorer.
    pub fn with_restorer<R>(&self, f: impl FnOnce(&SkeletalRestorer<K>) -> R) -> R {
        f(&self.inner.read())
    }
}
