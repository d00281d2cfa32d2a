use crate::errors::Result;
use linfa::Float;
use linfa_linalg::{cholesky::*, qr::*, triangular::*};
use ndarray::{Array2, ArrayBase, ArrayView2, Data, Ix2};

/// Computes squared euclidean distances between each row of `x` and each row
/// of `y`, resulting in a (nrows(x), nrows(y)) matrix.
/// *Panics* if x and y do not have the same column numbers
pub fn pairwise_sq_dists<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    assert!(x.ncols() == y.ncols());

    let mut result = Array2::zeros((x.nrows(), y.nrows()));
    for (i, x_row) in x.rows().into_iter().enumerate() {
        for (j, y_row) in y.rows().into_iter().enumerate() {
            let mut d2 = F::zero();
            for k in 0..x.ncols() {
                let d = x_row[k] - y_row[k];
                d2 = d2 + d * d;
            }
            result[[i, j]] = d2;
        }
    }
    result
}

/// Outer product `a . a^t` of a (n, d) matrix, summing over the d axis
pub(crate) fn tdot<F: Float>(a: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
    a.dot(&a.t())
}

/// Solve `L L^t x = b` given the lower Cholesky factor `L`
pub(crate) fn cho_solve<F: Float>(l: &Array2<F>, b: &ArrayView2<F>) -> Result<Array2<F>> {
    let z = l.solve_triangular(b, UPLO::Lower)?;
    Ok(l.t().solve_triangular(&z, UPLO::Upper)?)
}

/// Log-determinant of a positive-definite matrix given its lower Cholesky factor
pub(crate) fn chol_log_det<F: Float>(l: &Array2<F>) -> F {
    F::cast(2.) * l.diag().mapv(|v| v.ln()).sum()
}

/// Inverse of a symmetric positive-definite matrix given its lower Cholesky factor
pub(crate) fn spd_inverse_from_chol<F: Float>(l: &Array2<F>) -> Result<Array2<F>> {
    let li = l.solve_triangular(&Array2::eye(l.nrows()), UPLO::Lower)?;
    Ok(li.t().dot(&li))
}

/// Inverse of a symmetric positive-definite matrix
pub(crate) fn spd_inverse<F: Float>(m: &Array2<F>) -> Result<Array2<F>> {
    let l = m.cholesky()?;
    spd_inverse_from_chol(&l)
}

/// Solve the square system `a x = b` through a QR factorization of `a`.
/// Numerically looser than the Cholesky path but does not require `a`
/// to be positive-definite.
pub(crate) fn qr_solve<F: Float>(a: &Array2<F>, b: &ArrayView2<F>) -> Result<Array2<F>> {
    let (q, r) = a.qr()?.into_decomp();
    Ok(r.solve_triangular_into(q.t().dot(b), UPLO::Upper)?)
}
