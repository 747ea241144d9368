//! Dense linear algebra helpers shared by the model layer and estimators.
//!
//! Thin wrappers over nalgebra decompositions plus the couple of routines it
//! does not ship (real matrix exponential, orthogonal-complement projector).

use nalgebra::{DMatrix, DVector};

use crate::error::GstError;

/// Moore–Penrose pseudo-inverse via SVD with a relative singular-value cutoff.
pub fn pinv(m: &DMatrix<f64>, rel_tol: f64) -> Result<DMatrix<f64>, GstError> {
    let svd = m.clone().svd(true, true);
    let smax = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let eps = rel_tol * smax.max(1e-300);
    svd.pseudo_inverse(eps)
        .map_err(|_| GstError::SingularMatrix("pinv".into()))
}

/// Numerical rank: singular values above `rel_tol * s_max`.
pub fn rank(m: &DMatrix<f64>, rel_tol: f64) -> usize {
    let svd = m.clone().svd(false, false);
    let smax = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    svd.singular_values.iter().filter(|&&s| s > rel_tol * smax).count()
}

/// Real matrix exponential by scaling and squaring with a Taylor core.
///
/// Scales A by 2^-s so the scaled norm is below 0.5, sums the Taylor series
/// to machine precision, then squares s times. Adequate for the small
/// (d²×d²) error generators used here.
pub fn expm(a: &DMatrix<f64>) -> DMatrix<f64> {
    let n = a.nrows();
    let norm = a.iter().map(|x| x.abs()).fold(0.0_f64, f64::max) * n as f64;
    let s = if norm > 0.5 { (norm / 0.5).log2().ceil() as u32 } else { 0 };
    let scaled = a / 2.0_f64.powi(s as i32);

    let mut result = DMatrix::identity(n, n);
    let mut term = DMatrix::identity(n, n);
    for k in 1..=24 {
        term = (&term * &scaled) / k as f64;
        result += &term;
        if term.iter().map(|x| x.abs()).fold(0.0_f64, f64::max) < 1e-18 {
            break;
        }
    }
    for _ in 0..s {
        result = &result * &result;
    }
    result
}

/// Projector onto the orthogonal complement of the column space of `m`.
///
/// P = I - M (MᵀM)⁺ Mᵀ. Columns of `m` spanning a k-dimensional space leave
/// an (n-k)-dimensional complement.
pub fn complement_projector(m: &DMatrix<f64>, rel_tol: f64) -> Result<DMatrix<f64>, GstError> {
    let n = m.nrows();
    let gram = m.transpose() * m;
    let gram_pinv = pinv(&gram, rel_tol)?;
    Ok(DMatrix::identity(n, n) - m * gram_pinv * m.transpose())
}

/// Solve the symmetric positive-(semi)definite system `A x = b`, Cholesky
/// first, LU as fallback for marginally conditioned systems.
pub fn solve_spd(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, GstError> {
    if let Some(chol) = a.clone().cholesky() {
        return Ok(chol.solve(b));
    }
    a.clone()
        .lu()
        .solve(b)
        .ok_or_else(|| GstError::SingularMatrix("solve_spd".into()))
}

/// Frobenius norm of the difference of two matrices.
pub fn frobenius_distance(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    (a - b).iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Outer product of two vectors, flattened row-major.
///
/// Row-major flattening matches the parameter ordering of dense operator
/// Jacobians (entry (r,c) ↦ index r*ncols + c).
pub fn outer_flat(left: &DVector<f64>, right: &DVector<f64>) -> DVector<f64> {
    let mut out = DVector::zeros(left.len() * right.len());
    for r in 0..left.len() {
        for c in 0..right.len() {
            out[r * right.len() + c] = left[r] * right[c];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pinv_of_invertible_matches_inverse() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 0.0, 3.0]);
        let p = pinv(&m, 1e-12).unwrap();
        let inv = m.try_inverse().unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(p[(i, j)], inv[(i, j)], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn pinv_of_rank_deficient_satisfies_penrose() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let p = pinv(&m, 1e-10).unwrap();
        let mpm = &m * &p * &m;
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(mpm[(i, j)], m[(i, j)], epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn expm_of_zero_is_identity() {
        let z = DMatrix::zeros(3, 3);
        let e = expm(&z);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(e[(i, j)], expected, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn expm_matches_scalar_exponential_on_diagonal() {
        let m = DMatrix::from_diagonal(&DVector::from_vec(vec![0.3, -1.2, 2.0]));
        let e = expm(&m);
        assert_relative_eq!(e[(0, 0)], 0.3_f64.exp(), epsilon = 1e-12);
        assert_relative_eq!(e[(1, 1)], (-1.2_f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(e[(2, 2)], 2.0_f64.exp(), epsilon = 1e-12);
    }

    #[test]
    fn expm_rotation_generator_gives_rotation() {
        // exp(θ J) with J = [[0,-1],[1,0]] is a 2D rotation by θ
        let theta = 0.7;
        let j = DMatrix::from_row_slice(2, 2, &[0.0, -theta, theta, 0.0]);
        let e = expm(&j);
        assert_relative_eq!(e[(0, 0)], theta.cos(), epsilon = 1e-12);
        assert_relative_eq!(e[(1, 0)], theta.sin(), epsilon = 1e-12);
    }

    #[test]
    fn complement_projector_annihilates_columns() {
        let m = DMatrix::from_row_slice(3, 1, &[1.0, 1.0, 0.0]);
        let p = complement_projector(&m, 1e-12).unwrap();
        let pm = &p * &m;
        for i in 0..3 {
            assert_relative_eq!(pm[(i, 0)], 0.0, epsilon = 1e-10);
        }
        // projector is idempotent
        let pp = &p * &p;
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(pp[(i, j)], p[(i, j)], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn outer_flat_is_row_major() {
        let a = DVector::from_vec(vec![1.0, 2.0]);
        let b = DVector::from_vec(vec![3.0, 4.0, 5.0]);
        let o = outer_flat(&a, &b);
        assert_eq!(o.len(), 6);
        assert_relative_eq!(o[0], 3.0);
        assert_relative_eq!(o[2], 5.0);
        assert_relative_eq!(o[3], 6.0);
    }
}
