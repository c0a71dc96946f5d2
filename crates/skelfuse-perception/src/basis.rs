//! Basis registration.
//!
//! Estimates the rigid transform (rotation + displacement) that carries points
//! expressed in one camera's coordinate basis onto a reference basis, from a
//! one-time set of matched point pairs.  The rotation is fitted with the
//! Kabsch–Umeyama algorithm and is always a proper rotation (`det = +1`):
//! a skeleton must never come out mirrored.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::DMatrix;
//! use skelfuse_perception::basis::BasisTranslator;
//!
//! // Four points, and the same points shifted by +2 along X.
//! let source = DMatrix::from_row_slice(4, 3, &[
//!     0.0, 0.0, 0.0,
//!     1.0, 0.0, 0.0,
//!     0.0, 1.0, 0.0,
//!     0.0, 0.0, 1.0,
//! ]);
//! let destination = DMatrix::from_fn(4, 3, |i, j| {
//!     source[(i, j)] + if j == 0 { 2.0 } else { 0.0 }
//! });
//!
//! let translator = BasisTranslator::register(&source, &destination).unwrap();
//! let moved = translator.translate(&source).unwrap();
//! assert!((moved - destination).norm() < 1e-9);
//! ```

use nalgebra::{DMatrix, DVector};
use skelfuse_types::FusionError;
use tracing::{debug, trace};

use crate::matrix::{all_finite, rms_residual, shape_of};

/// Centered point clouds whose total squared spread is at or below this value
/// cannot pin down a rotation.
const MIN_SPREAD: f64 = 1e-12;

// ────────────────────────────────────────────────────────────────────────────
// Primitives
// ────────────────────────────────────────────────────────────────────────────

/// Column-wise mean of an n×m point set (the centroid, length m).
pub fn centroid(points: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_fn(points.ncols(), |j, _| points.column(j).mean())
}

/// Subtract the centroid from every row of `points`.
pub fn center(points: &DMatrix<f64>) -> DMatrix<f64> {
    let c = centroid(points);
    DMatrix::from_fn(points.nrows(), points.ncols(), |i, j| points[(i, j)] - c[j])
}

// ────────────────────────────────────────────────────────────────────────────
// RigidTransform
// ────────────────────────────────────────────────────────────────────────────

/// An immutable rotation + displacement pair.
///
/// Maps a row point `p` to `R · p + d`.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidTransform {
    rotation: DMatrix<f64>,
    displacement: DVector<f64>,
}

impl RigidTransform {
    /// The identity transform in `dimension`-D space.
    pub fn identity(dimension: usize) -> Self {
        Self {
            rotation: DMatrix::identity(dimension, dimension),
            displacement: DVector::zeros(dimension),
        }
    }

    /// The m×m rotation matrix.
    pub fn rotation(&self) -> &DMatrix<f64> {
        &self.rotation
    }

    /// The length-m displacement vector.
    pub fn displacement(&self) -> &DVector<f64> {
        &self.displacement
    }

    pub fn dimension(&self) -> usize {
        self.displacement.len()
    }

    /// Apply the transform to every row of an n×m matrix.
    pub fn apply(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>, FusionError> {
        let m = self.dimension();
        if points.ncols() != m {
            return Err(FusionError::shape(
                format!("{m} columns"),
                format!("{} columns", points.ncols()),
            ));
        }
        // (R · Pᵗ)ᵗ == P · Rᵗ
        let rotated = points * self.rotation.transpose();
        Ok(DMatrix::from_fn(points.nrows(), m, |i, j| {
            rotated[(i, j)] + self.displacement[j]
        }))
    }

    /// Apply the transform to a single point.
    pub fn apply_point(&self, point: &DVector<f64>) -> Result<DVector<f64>, FusionError> {
        let m = self.dimension();
        if point.len() != m {
            return Err(FusionError::shape(
                format!("{m} coordinates"),
                format!("{} coordinates", point.len()),
            ));
        }
        Ok(&self.rotation * point + &self.displacement)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// BasisTranslator
// ────────────────────────────────────────────────────────────────────────────

/// Translates points from a source basis into a destination basis.
///
/// Built once with [`BasisTranslator::register`]; afterwards it is read-only
/// and can be shared freely between threads.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisTranslator {
    transform: RigidTransform,
    source_centroid: DVector<f64>,
    destination_centroid: DVector<f64>,
}

impl BasisTranslator {
    /// Fit the transform mapping `source` rows onto `destination` rows.
    ///
    /// Both sets are n×m with row `i` of one matching row `i` of the other.
    /// Three or more non-collinear points are needed for a well-posed 3-D fit;
    /// fewer are accepted but the rotation is then underdetermined.
    ///
    /// # Errors
    ///
    /// - [`FusionError::ShapeMismatch`] when the two sets differ in shape.
    /// - [`FusionError::NonFinite`] when either set holds NaN or infinity.
    /// - [`FusionError::DegenerateInput`] when a set is empty or has
    ///   (near-)zero spread around its centroid.
    pub fn register(
        source: &DMatrix<f64>,
        destination: &DMatrix<f64>,
    ) -> Result<Self, FusionError> {
        if source.shape() != destination.shape() {
            return Err(FusionError::shape(shape_of(source), shape_of(destination)));
        }
        let (n, m) = source.shape();
        if n == 0 || m == 0 {
            return Err(FusionError::DegenerateInput(format!(
                "empty point set ({n}x{m})"
            )));
        }
        if !all_finite(source) {
            return Err(FusionError::NonFinite("source points".to_string()));
        }
        if !all_finite(destination) {
            return Err(FusionError::NonFinite("destination points".to_string()));
        }

        let source_centroid = centroid(source);
        let destination_centroid = centroid(destination);
        let p = center(source);
        let q = center(destination);
        if p.norm_squared() <= MIN_SPREAD || q.norm_squared() <= MIN_SPREAD {
            return Err(FusionError::DegenerateInput(
                "calibration points have no spread around their centroid".to_string(),
            ));
        }

        let rotation = kabsch(&p, &q)?;
        let displacement = &destination_centroid - &rotation * &source_centroid;

        let translator = Self {
            transform: RigidTransform {
                rotation,
                displacement,
            },
            source_centroid,
            destination_centroid,
        };

        let rms = translator
            .translate(source)
            .map(|fitted| rms_residual(&fitted, destination))?;
        debug!(points = n, dims = m, rms, "registered basis transform");

        Ok(translator)
    }

    /// A translator that leaves `dimension`-D points untouched.
    pub fn identity(dimension: usize) -> Self {
        Self {
            transform: RigidTransform::identity(dimension),
            source_centroid: DVector::zeros(dimension),
            destination_centroid: DVector::zeros(dimension),
        }
    }

    /// Full transform: `points' = (R · pointsᵗ)ᵗ + d`, row by row.
    pub fn translate(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>, FusionError> {
        self.transform.apply(points)
    }

    pub fn translate_point(&self, point: &DVector<f64>) -> Result<DVector<f64>, FusionError> {
        self.transform.apply_point(point)
    }

    pub fn transform(&self) -> &RigidTransform {
        &self.transform
    }

    pub fn rotation(&self) -> &DMatrix<f64> {
        self.transform.rotation()
    }

    pub fn displacement(&self) -> &DVector<f64> {
        self.transform.displacement()
    }

    pub fn dimension(&self) -> usize {
        self.transform.dimension()
    }

    /// Centroid of the calibration points in the source basis.
    pub fn source_centroid(&self) -> &DVector<f64> {
        &self.source_centroid
    }

    /// Centroid of the calibration points in the destination basis.
    pub fn destination_centroid(&self) -> &DVector<f64> {
        &self.destination_centroid
    }
}

/// Kabsch–Umeyama rotation between two centered point sets.
fn kabsch(p: &DMatrix<f64>, q: &DMatrix<f64>) -> Result<DMatrix<f64>, FusionError> {
    let h = p.transpose() * q;
    // `svd` sorts singular values in descending order, so the last column of
    // V pairs with the smallest one.
    let svd = h.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(FusionError::DegenerateInput(
            "cross-covariance could not be decomposed".to_string(),
        ));
    };

    let mut v = v_t.transpose();
    let mut r = &v * u.transpose();
    if r.determinant() < 0.0 {
        let weakest = v.ncols() - 1;
        trace!(axis = weakest, "correcting reflected fit");
        v.column_mut(weakest).neg_mut();
        r = &v * u.transpose();
    }
    Ok(r)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn cloud() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            6,
            3,
            &[
                0.1, 0.2, 0.3, //
                1.4, -0.3, 0.8, //
                -0.7, 1.1, 0.2, //
                0.5, 0.9, -1.3, //
                2.0, 0.4, 0.6, //
                -1.2, -0.8, 1.7,
            ],
        )
    }

    fn rotation(roll: f64, pitch: f64, yaw: f64) -> DMatrix<f64> {
        let r = Rotation3::from_euler_angles(roll, pitch, yaw);
        DMatrix::from_column_slice(3, 3, r.matrix().as_slice())
    }

    /// Q = (R · Pᵗ)ᵗ + t
    fn move_cloud(p: &DMatrix<f64>, r: &DMatrix<f64>, t: [f64; 3]) -> DMatrix<f64> {
        let rotated = p * r.transpose();
        DMatrix::from_fn(p.nrows(), 3, |i, j| rotated[(i, j)] + t[j])
    }

    fn assert_proper_rotation(r: &DMatrix<f64>) {
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(
            r.transpose() * r,
            DMatrix::<f64>::identity(r.nrows(), r.ncols()),
            epsilon = 1e-9
        );
    }

    // ── center ──────────────────────────────────────────────────────────────

    #[test]
    fn center_yields_zero_mean_columns() {
        let c = center(&cloud());
        assert_eq!(c.shape(), (6, 3));
        for j in 0..3 {
            assert!(c.column(j).mean().abs() < 1e-12);
        }
    }

    #[test]
    fn center_of_centered_is_noop() {
        let once = center(&cloud());
        let twice = center(&once);
        assert_relative_eq!(once, twice, epsilon = 1e-12);
    }

    // ── register ────────────────────────────────────────────────────────────

    #[test]
    fn recovers_known_rotation_and_translation() {
        let p = cloud();
        let r = rotation(0.3, -0.5, 1.1);
        let q = move_cloud(&p, &r, [0.5, -2.0, 3.25]);

        let tr = BasisTranslator::register(&p, &q).unwrap();
        assert_relative_eq!(tr.rotation().clone(), r, epsilon = 1e-9);
        assert_relative_eq!(
            tr.displacement().clone(),
            DVector::from_vec(vec![0.5, -2.0, 3.25]),
            epsilon = 1e-9
        );
        assert_relative_eq!(tr.translate(&p).unwrap(), q, epsilon = 1e-9);
        assert_proper_rotation(tr.rotation());
    }

    #[test]
    fn pure_translation_gives_identity_rotation() {
        let p = cloud();
        let q = move_cloud(&p, &DMatrix::<f64>::identity(3, 3), [1.0, 2.0, 3.0]);

        let tr = BasisTranslator::register(&p, &q).unwrap();
        assert_relative_eq!(tr.rotation().clone(), DMatrix::<f64>::identity(3, 3), epsilon = 1e-9);
    }

    #[test]
    fn mirrored_input_is_corrected_to_proper_rotation() {
        // Negating a single axis is a reflection; the naive fit has det = -1.
        let p = cloud();
        let mut q = p.clone();
        q.column_mut(0).neg_mut();

        let tr = BasisTranslator::register(&p, &q).unwrap();
        assert_proper_rotation(tr.rotation());
    }

    #[test]
    fn planar_mirror_is_fit_by_flipping_the_out_of_plane_axis() {
        // Flat in z, so the weakest singular direction is z. Mirroring x is
        // then reachable exactly by a half turn about y.
        let p = DMatrix::from_row_slice(
            4,
            3,
            &[
                0.0, 0.0, 0.0, //
                2.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, //
                2.0, 1.0, 0.0,
            ],
        );
        let mut q = p.clone();
        q.column_mut(0).neg_mut();

        let tr = BasisTranslator::register(&p, &q).unwrap();
        assert_proper_rotation(tr.rotation());
        assert_relative_eq!(
            tr.rotation().clone(),
            DMatrix::from_diagonal(&DVector::from_vec(vec![-1.0, 1.0, -1.0])),
            epsilon = 1e-9
        );
        assert_relative_eq!(tr.translate(&p).unwrap(), q, epsilon = 1e-9);
    }

    #[test]
    fn three_flipped_axes_still_yield_rotation() {
        let p = cloud();
        let q = -p.clone();

        let tr = BasisTranslator::register(&p, &q).unwrap();
        assert_proper_rotation(tr.rotation());
    }

    #[test]
    fn centroid_is_preserved() {
        // Holds for any fit, exact or not.
        let p = cloud();
        let mut q = move_cloud(&p, &rotation(0.2, 0.0, -0.4), [1.0, 0.0, -1.0]);
        q[(2, 1)] += 0.3;
        q[(4, 0)] -= 0.2;

        let tr = BasisTranslator::register(&p, &q).unwrap();
        let mapped = tr.translate_point(tr.source_centroid()).unwrap();
        assert_relative_eq!(mapped, centroid(&q), epsilon = 1e-9);
        assert_relative_eq!(tr.destination_centroid().clone(), centroid(&q), epsilon = 1e-12);
    }

    #[test]
    fn planar_points_fit_in_two_dimensions() {
        let p = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 2.0]);
        // 90° counter-clockwise: (x, y) -> (-y, x)
        let q = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 0.0, 1.0, -2.0, 0.0]);

        let tr = BasisTranslator::register(&p, &q).unwrap();
        assert_eq!(tr.dimension(), 2);
        assert_relative_eq!(tr.translate(&p).unwrap(), q, epsilon = 1e-9);
        assert_proper_rotation(tr.rotation());
    }

    #[test]
    fn shape_mismatch_rows() {
        let p = cloud();
        let q = p.rows(0, 5).into_owned();
        let err = BasisTranslator::register(&p, &q).unwrap_err();
        assert!(matches!(err, FusionError::ShapeMismatch { .. }));
    }

    #[test]
    fn shape_mismatch_columns() {
        let p = cloud();
        let q = p.columns(0, 2).into_owned();
        let err = BasisTranslator::register(&p, &q).unwrap_err();
        assert!(matches!(err, FusionError::ShapeMismatch { .. }));
    }

    #[test]
    fn coincident_points_are_degenerate() {
        let p = DMatrix::from_element(4, 3, 1.5);
        let q = cloud().rows(0, 4).into_owned();
        let err = BasisTranslator::register(&p, &q).unwrap_err();
        assert!(matches!(err, FusionError::DegenerateInput(_)));
    }

    #[test]
    fn empty_point_set_is_degenerate() {
        let p = DMatrix::<f64>::zeros(0, 3);
        let err = BasisTranslator::register(&p, &p).unwrap_err();
        assert!(matches!(err, FusionError::DegenerateInput(_)));
    }

    #[test]
    fn nan_is_rejected_before_fitting() {
        let p = cloud();
        let mut q = p.clone();
        q[(3, 2)] = f64::NAN;
        let err = BasisTranslator::register(&p, &q).unwrap_err();
        assert_eq!(err, FusionError::NonFinite("destination points".to_string()));
    }

    // ── translate ───────────────────────────────────────────────────────────

    #[test]
    fn translate_single_point_matches_batch() {
        let p = cloud();
        let q = move_cloud(&p, &rotation(1.0, 0.2, 0.0), [0.0, 4.0, 0.0]);
        let tr = BasisTranslator::register(&p, &q).unwrap();

        let batch = tr.translate(&p).unwrap();
        let single = tr
            .translate_point(&DVector::from_iterator(3, p.row(2).iter().copied()))
            .unwrap();
        assert_relative_eq!(single, batch.row(2).transpose(), epsilon = 1e-12);
    }

    #[test]
    fn translate_rejects_wrong_width() {
        let tr = BasisTranslator::identity(3);
        let err = tr.translate(&DMatrix::zeros(2, 4)).unwrap_err();
        assert!(matches!(err, FusionError::ShapeMismatch { .. }));
        let err = tr.translate_point(&DVector::zeros(2)).unwrap_err();
        assert!(matches!(err, FusionError::ShapeMismatch { .. }));
    }

    #[test]
    fn identity_translator_passes_points_through() {
        let p = cloud();
        let tr = BasisTranslator::identity(3);
        assert_eq!(tr.translate(&p).unwrap(), p);
    }
}
