//! Conversions between wire records and `nalgebra` matrices, plus a few
//! numeric helpers shared by registration and fusion.

use nalgebra::DMatrix;
use skelfuse_types::{LandmarkSample, DIMENSIONS, SAMPLE_COLUMNS};

/// Build an n×3 point set from row arrays.
pub fn points_from_rows(rows: &[[f64; DIMENSIONS]]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), DIMENSIONS, |i, j| rows[i][j])
}

/// Build an n×5 landmark matrix (x, y, z, visibility, presence).
pub fn samples_to_matrix(samples: &[LandmarkSample]) -> DMatrix<f64> {
    DMatrix::from_fn(samples.len(), SAMPLE_COLUMNS, |i, j| samples[i].to_row()[j])
}

/// Split the first three columns of `points` into row arrays.
///
/// Missing columns read as `0.0`.
pub fn matrix_to_rows(points: &DMatrix<f64>) -> Vec<[f64; DIMENSIONS]> {
    (0..points.nrows())
        .map(|i| {
            let mut row = [0.0; DIMENSIONS];
            for (j, v) in row.iter_mut().enumerate().take(points.ncols()) {
                *v = points[(i, j)];
            }
            row
        })
        .collect()
}

pub fn all_finite(m: &DMatrix<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
}

/// Root-mean-square distance between corresponding rows of `a` and `b`.
///
/// Returns `0.0` for empty or mismatched inputs.
pub fn rms_residual(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    if a.shape() != b.shape() || a.nrows() == 0 {
        return 0.0;
    }
    ((a - b).norm_squared() / a.nrows() as f64).sqrt()
}

/// Human-readable `n×m` shape, used in error messages.
pub(crate) fn shape_of(m: &DMatrix<f64>) -> String {
    format!("{}x{}", m.nrows(), m.ncols())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_roundtrip_through_rows() {
        let rows = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let m = points_from_rows(&rows);
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m[(1, 2)], 6.0);
        assert_eq!(matrix_to_rows(&m), rows.to_vec());
    }

    #[test]
    fn samples_fill_five_columns() {
        let m = samples_to_matrix(&[LandmarkSample::new(1.0, 2.0, 3.0, 0.5, 0.25)]);
        assert_eq!(m.shape(), (1, 5));
        assert_eq!(m[(0, 3)], 0.5);
        assert_eq!(m[(0, 4)], 0.25);
    }

    #[test]
    fn all_finite_rejects_nan() {
        let mut m = DMatrix::<f64>::zeros(2, 3);
        assert!(all_finite(&m));
        m[(1, 1)] = f64::NAN;
        assert!(!all_finite(&m));
    }

    #[test]
    fn rms_residual_of_unit_offset() {
        let a = DMatrix::<f64>::zeros(4, 3);
        let b = DMatrix::from_element(4, 3, 1.0);
        // every row is sqrt(3) away
        assert!((rms_residual(&a, &b) - 3.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn rms_residual_mismatched_shapes_is_zero() {
        let a = DMatrix::<f64>::zeros(4, 3);
        let b = DMatrix::<f64>::zeros(3, 3);
        assert_eq!(rms_residual(&a, &b), 0.0);
    }
}
