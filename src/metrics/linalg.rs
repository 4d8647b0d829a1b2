//! Symmetric matrix square root and the trace identity used by FID.

use nalgebra::DMatrix;
use ndarray::ArrayView2;

use crate::error::{Error, Result};

/// Singular values below this are passed through instead of square-rooted.
pub const SQRT_EPS: f64 = 1e-10;

/// Iteration cap for the SVD; non-convergence is reported, not retried.
const MAX_SVD_ITERATIONS: usize = 10_000;

/// Matrix square root `M'` of a symmetric matrix, with `M' * M' = mat`.
///
/// Computed as `U diag(sqrt(s)) V^T` from the SVD of `mat`. Singular values
/// below `eps` are left as they are: `sqrt` is unstable near zero and would
/// amplify SVD noise in the null space.
///
/// Only valid for symmetric input; the result is meaningless otherwise.
pub fn sqrt_symmetric(mat: &DMatrix<f64>, eps: f64) -> Result<DMatrix<f64>> {
    if !mat.is_square() {
        return Err(Error::shape(
            "matrix",
            "a square matrix",
            (mat.nrows(), mat.ncols()),
        ));
    }

    let svd = mat
        .clone()
        .try_svd(true, true, f64::EPSILON, MAX_SVD_ITERATIONS)
        .ok_or_else(|| Error::Decomposition("SVD did not converge".to_string()))?;
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(Error::Decomposition(
            "SVD returned no singular vectors".to_string(),
        ));
    };

    let si = svd
        .singular_values
        .map(|s| if s < eps { s } else { s.sqrt() });

    Ok(u * DMatrix::from_diagonal(&si) * v_t)
}

/// `trace(sqrt(sigma * sigma_v))` for two covariance matrices.
///
/// `sigma * sigma_v` is not symmetric, so its square root cannot be taken
/// with [`sqrt_symmetric`]. With `A = sqrt(sigma)`:
///
/// - `eig(A A sigma_v) = eig(A sigma_v A)` (cyclic permutation),
/// - the eigenvalues of a square root are the square roots of the eigenvalues,
/// - the trace is the sum of eigenvalues,
///
/// so `trace(sqrt(sigma sigma_v)) = trace(sqrt(A sigma_v A))`, and
/// `A sigma_v A` is symmetric.
pub fn trace_sqrt_product(sigma: &DMatrix<f64>, sigma_v: &DMatrix<f64>) -> Result<f64> {
    if sigma.shape() != sigma_v.shape() {
        return Err(Error::shape(
            "sigma_v",
            format!("{:?} like sigma", sigma.shape()),
            sigma_v.shape(),
        ));
    }

    let sqrt_sigma = sqrt_symmetric(sigma, SQRT_EPS)?;
    let sqrt_a_sigmav_a = &sqrt_sigma * (sigma_v * &sqrt_sigma);

    Ok(sqrt_symmetric(&sqrt_a_sigmav_a, SQRT_EPS)?.trace())
}

/// Copy an ndarray matrix into nalgebra storage.
#[must_use]
pub fn to_dmatrix(a: ArrayView2<'_, f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[[i, j]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_abs_diff(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
        (a - b).iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    /// Symmetric positive definite matrix `B B^T + I`.
    fn spd(n: usize, seed: u64) -> DMatrix<f64> {
        let mut state = seed;
        let b = DMatrix::from_fn(n, n, |_, _| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5
        });
        &b * b.transpose() + DMatrix::identity(n, n)
    }

    #[test]
    fn test_sqrt_of_identity() {
        let eye = DMatrix::<f64>::identity(5, 5);
        let root = sqrt_symmetric(&eye, SQRT_EPS).unwrap();
        assert!(max_abs_diff(&root, &eye) < 1e-12);
    }

    #[test]
    fn test_sqrt_squares_back() {
        for seed in [1, 7, 42] {
            let m = spd(6, seed);
            let root = sqrt_symmetric(&m, SQRT_EPS).unwrap();
            let back = &root * &root;
            let tol = 1e-10 * m.norm();
            assert!(max_abs_diff(&back, &m) < tol, "seed {seed}");
        }
    }

    #[test]
    fn test_sqrt_diagonal() {
        let m = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![4.0, 9.0, 16.0]));
        let root = sqrt_symmetric(&m, SQRT_EPS).unwrap();
        let expected = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![2.0, 3.0, 4.0]));
        assert!(max_abs_diff(&root, &expected) < 1e-12);
    }

    #[test]
    fn test_tiny_singular_values_pass_through() {
        let m = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![4.0, 1e-12]));
        let root = sqrt_symmetric(&m, SQRT_EPS).unwrap();
        assert!((root[(0, 0)] - 2.0).abs() < 1e-12);
        assert!((root[(1, 1)] - 1e-12).abs() < 1e-15);
    }

    #[test]
    fn test_non_square_rejected() {
        let m = DMatrix::<f64>::zeros(2, 3);
        assert!(matches!(sqrt_symmetric(&m, SQRT_EPS), Err(Error::Shape { .. })));
    }

    #[test]
    fn test_trace_sqrt_product_commuting() {
        // Diagonal matrices commute: sqrt(diag(a) diag(b)) = diag(sqrt(a b))
        let a = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![1.0, 4.0, 9.0]));
        let b = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![16.0, 1.0, 4.0]));
        let trace = trace_sqrt_product(&a, &b).unwrap();
        assert!((trace - (4.0 + 2.0 + 6.0)).abs() < 1e-10);
    }

    #[test]
    fn test_trace_sqrt_product_symmetric_in_arguments() {
        let a = spd(4, 3);
        let b = spd(4, 11);
        let ab = trace_sqrt_product(&a, &b).unwrap();
        let ba = trace_sqrt_product(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-9 * ab.abs().max(1.0));
    }

    #[test]
    fn test_to_dmatrix_layout() {
        let a = ndarray::array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let m = to_dmatrix(a.view());
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(m[(0, 2)], 3.0);
    }
}
