//! A module for covariance functions used as priors over the latent processes
//! of the mixture.
//!
//! The following covariance models are implemented:
//! * squared exponential,
//! * matern 3/2.
//!
//! Each model owns its hyperparameters (signal variance and lengthscale) and
//! accumulates their gradients from a `dL/dK` dual matrix supplied by the
//! model, so the mixture never has to know kernel internals.

use crate::utils::pairwise_sq_dists;
use linfa::Float;
use ndarray::{array, Array1, Array2, ArrayView1, ArrayView2};
use std::fmt;

/// A trait for covariance functions of the latent Gaussian processes.
///
/// A covariance function evaluates the covariance matrix between two sets of
/// input locations and turns a gradient-of-bound-wrt-covariance-matrix signal
/// into gradients on its own hyperparameters. Hyperparameters are exposed as
/// a flat vector of positive values so the optimization driver can iterate
/// over components generically.
pub trait CovarianceFunction<F: Float>: fmt::Display + Send + Sync {
    /// Compute the covariance matrix K(x, x2) of shape (nrows(x), nrows(x2))
    fn value(&self, x: ArrayView2<F>, x2: ArrayView2<F>) -> Array2<F>;

    /// Compute the symmetric covariance matrix K(x, x)
    fn value_self(&self, x: ArrayView2<F>) -> Array2<F> {
        self.value(x, x)
    }

    /// Accumulate hyperparameter gradients given `dl_dk`, the gradient of the
    /// bound with respect to each entry of K(x, x). Overwrites any previously
    /// stored gradient.
    fn update_gradients_full(&mut self, dl_dk: ArrayView2<F>, x: ArrayView2<F>);

    /// Number of hyperparameters
    fn n_params(&self) -> usize;

    /// Hyperparameter values (positive)
    fn params(&self) -> Array1<F>;

    /// Set hyperparameter values (positive)
    fn set_params(&mut self, params: ArrayView1<F>);

    /// Gradient of the bound with respect to the hyperparameters, as last
    /// accumulated by [`update_gradients_full`](CovarianceFunction::update_gradients_full)
    fn gradient(&self) -> Array1<F>;

    /// Clone this covariance function into an independently-owned box
    fn clone_box(&self) -> Box<dyn CovarianceFunction<F>>;
}

impl<F: Float> Clone for Box<dyn CovarianceFunction<F>> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Squared exponential covariance model
#[derive(Debug, Clone, PartialEq)]
pub struct SquaredExponentialCov<F: Float> {
    variance: F,
    lengthscale: F,
    gradient: Array1<F>,
}

impl<F: Float> SquaredExponentialCov<F> {
    /// Constructor with given signal variance and lengthscale
    pub fn new(variance: F, lengthscale: F) -> Self {
        SquaredExponentialCov {
            variance,
            lengthscale,
            gradient: Array1::zeros(2),
        }
    }
}

impl<F: Float> Default for SquaredExponentialCov<F> {
    fn default() -> Self {
        Self::new(F::one(), F::one())
    }
}

impl<F: Float> CovarianceFunction<F> for SquaredExponentialCov<F> {
    /// variance * exp( - d2 / (2 * lengthscale^2) )
    fn value(&self, x: ArrayView2<F>, x2: ArrayView2<F>) -> Array2<F> {
        let half = F::cast(0.5);
        let l2 = self.lengthscale * self.lengthscale;
        pairwise_sq_dists(&x, &x2).mapv(|d2| self.variance * F::exp(-half * d2 / l2))
    }

    fn update_gradients_full(&mut self, dl_dk: ArrayView2<F>, x: ArrayView2<F>) {
        let d2 = pairwise_sq_dists(&x, &x);
        let half = F::cast(0.5);
        let l2 = self.lengthscale * self.lengthscale;
        let k = d2.mapv(|v| self.variance * F::exp(-half * v / l2));

        // dK/dvariance = K / variance, dK/dlengthscale = K * d2 / lengthscale^3
        let weighted = &dl_dk.to_owned() * &k;
        let d_variance = weighted.sum() / self.variance;
        let d_lengthscale = (&weighted * &d2).sum() / (l2 * self.lengthscale);
        self.gradient = array![d_variance, d_lengthscale];
    }

    fn n_params(&self) -> usize {
        2
    }

    fn params(&self) -> Array1<F> {
        array![self.variance, self.lengthscale]
    }

    fn set_params(&mut self, params: ArrayView1<F>) {
        self.variance = params[0];
        self.lengthscale = params[1];
    }

    fn gradient(&self) -> Array1<F> {
        self.gradient.to_owned()
    }

    fn clone_box(&self) -> Box<dyn CovarianceFunction<F>> {
        Box::new(self.clone())
    }
}

impl<F: Float> fmt::Display for SquaredExponentialCov<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SquaredExponential(variance={}, lengthscale={})",
            self.variance, self.lengthscale
        )
    }
}

/// Matern 3/2 covariance model
#[derive(Debug, Clone, PartialEq)]
pub struct Matern32Cov<F: Float> {
    variance: F,
    lengthscale: F,
    gradient: Array1<F>,
}

impl<F: Float> Matern32Cov<F> {
    /// Constructor with given signal variance and lengthscale
    pub fn new(variance: F, lengthscale: F) -> Self {
        Matern32Cov {
            variance,
            lengthscale,
            gradient: Array1::zeros(2),
        }
    }
}

impl<F: Float> Default for Matern32Cov<F> {
    fn default() -> Self {
        Self::new(F::one(), F::one())
    }
}

impl<F: Float> CovarianceFunction<F> for Matern32Cov<F> {
    /// variance * (1 + sqrt(3) * d / lengthscale) * exp( - sqrt(3) * d / lengthscale )
    fn value(&self, x: ArrayView2<F>, x2: ArrayView2<F>) -> Array2<F> {
        let sqrt3 = F::cast(3.).sqrt();
        pairwise_sq_dists(&x, &x2).mapv(|d2| {
            let r = sqrt3 * d2.sqrt() / self.lengthscale;
            self.variance * (F::one() + r) * F::exp(-r)
        })
    }

    fn update_gradients_full(&mut self, dl_dk: ArrayView2<F>, x: ArrayView2<F>) {
        let sqrt3 = F::cast(3.).sqrt();
        let d2 = pairwise_sq_dists(&x, &x);
        let k = d2.mapv(|v| {
            let r = sqrt3 * v.sqrt() / self.lengthscale;
            self.variance * (F::one() + r) * F::exp(-r)
        });
        let l3 = self.lengthscale * self.lengthscale * self.lengthscale;

        // dK/dvariance = K / variance
        // dK/dlengthscale = variance * 3 * d2 / lengthscale^3 * exp(-sqrt(3) * d / lengthscale)
        let d_variance = (&dl_dk.to_owned() * &k).sum() / self.variance;
        let dk_dl = d2.mapv(|v| {
            let r = sqrt3 * v.sqrt() / self.lengthscale;
            self.variance * F::cast(3.) * v / l3 * F::exp(-r)
        });
        let d_lengthscale = (&dl_dk.to_owned() * &dk_dl).sum();
        self.gradient = array![d_variance, d_lengthscale];
    }

    fn n_params(&self) -> usize {
        2
    }

    fn params(&self) -> Array1<F> {
        array![self.variance, self.lengthscale]
    }

    fn set_params(&mut self, params: ArrayView1<F>) {
        self.variance = params[0];
        self.lengthscale = params[1];
    }

    fn gradient(&self) -> Array1<F> {
        self.gradient.to_owned()
    }

    fn clone_box(&self) -> Box<dyn CovarianceFunction<F>> {
        Box::new(self.clone())
    }
}

impl<F: Float> fmt::Display for Matern32Cov<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Matern32(variance={}, lengthscale={})",
            self.variance, self.lengthscale
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn xt() -> Array2<f64> {
        array![[0.0], [0.7], [1.5], [2.2], [3.4]]
    }

    #[test]
    fn test_squared_exponential_value() {
        let kern = SquaredExponentialCov::new(2.0, 1.3);
        let k = kern.value_self(xt().view());
        // diagonal is the signal variance, matrix is symmetric
        for i in 0..5 {
            assert_abs_diff_eq!(k[[i, i]], 2.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(k.t().to_owned(), k, epsilon = 1e-12);
        assert_abs_diff_eq!(
            k[[0, 1]],
            2.0 * (-0.49f64 / (2. * 1.69)).exp(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_matern32_value() {
        let kern = Matern32Cov::new(1.5, 0.8);
        let k = kern.value_self(xt().view());
        for i in 0..5 {
            assert_abs_diff_eq!(k[[i, i]], 1.5, epsilon = 1e-12);
        }
        let r = 3f64.sqrt() * 0.7 / 0.8;
        assert_abs_diff_eq!(k[[0, 1]], 1.5 * (1. + r) * (-r).exp(), epsilon = 1e-12);
    }

    fn check_gradients(mut kern: Box<dyn CovarianceFunction<f64>>) {
        let x = xt();
        // with dL/dK all ones the accumulated gradient is the derivative of
        // the sum of all covariance entries
        let ones = Array2::from_elem((5, 5), 1.0);
        kern.update_gradients_full(ones.view(), x.view());
        let grad = kern.gradient();

        let p0 = kern.params();
        let h = 1e-6;
        for j in 0..kern.n_params() {
            let mut hi = p0.to_owned();
            hi[j] += h;
            kern.set_params(hi.view());
            let f_hi = kern.value_self(x.view()).sum();

            let mut lo = p0.to_owned();
            lo[j] -= h;
            kern.set_params(lo.view());
            let f_lo = kern.value_self(x.view()).sum();

            kern.set_params(p0.view());
            let fd = (f_hi - f_lo) / (2. * h);
            assert_abs_diff_eq!(grad[j], fd, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_squared_exponential_gradients() {
        check_gradients(Box::new(SquaredExponentialCov::new(1.7, 0.9)));
    }

    #[test]
    fn test_matern32_gradients() {
        check_gradients(Box::new(Matern32Cov::new(0.6, 1.4)));
    }

    #[test]
    fn test_clone_box_is_independent() {
        let kern = SquaredExponentialCov::new(1.0, 2.0);
        let mut copy = kern.clone_box();
        copy.set_params(array![3.0, 4.0].view());
        assert_abs_diff_eq!(kern.params()[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(copy.params()[0], 3.0, epsilon = 1e-12);
    }
}
