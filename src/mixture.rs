//! Collapsed variational mixture machinery: the soft assignment matrix, its
//! entropy and the collapsed Dirichlet mixing-proportion bound.
//!
//! Assignments are parameterized by unconstrained logits; the responsibility
//! matrix is their row-wise softmax so every row lies on the probability
//! simplex by construction and natural-gradient steps can never leave it.

use crate::errors::{OmgpError, Result};
use linfa::Float;
use ndarray::{Array, Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use num_traits::ToPrimitive;
use rand_xoshiro::Xoshiro256Plus;
use statrs::function::gamma::{digamma, ln_gamma};

/// Soft assignment state of a collapsed mixture with a symmetric Dirichlet
/// prior over component labels.
pub struct CollapsedMixture<F: Float> {
    n_data: usize,
    n_components: usize,
    /// Concentration of the symmetric Dirichlet prior over labels
    alpha: F,
    /// Unconstrained assignment logits (n_data, n_components)
    logits: Array2<F>,
    /// Row-wise softmax of the logits
    phi: Array2<F>,
    log_phi: Array2<F>,
    entropy: F,
}

impl<F: Float> Clone for CollapsedMixture<F> {
    fn clone(&self) -> Self {
        Self {
            n_data: self.n_data,
            n_components: self.n_components,
            alpha: self.alpha,
            logits: self.logits.to_owned(),
            phi: self.phi.to_owned(),
            log_phi: self.log_phi.to_owned(),
            entropy: self.entropy,
        }
    }
}

impl<F: Float> CollapsedMixture<F> {
    /// Create a mixture state with randomly initialized logits
    pub fn new(n_data: usize, n_components: usize, alpha: F, rng: &mut Xoshiro256Plus) -> Self {
        let logits = Array::<f64, _>::random_using(
            (n_data, n_components),
            Normal::new(0., 1.).unwrap(),
            rng,
        )
        .mapv(F::cast);
        let mut mixture = CollapsedMixture {
            n_data,
            n_components,
            alpha,
            logits,
            phi: Array2::zeros((n_data, n_components)),
            log_phi: Array2::zeros((n_data, n_components)),
            entropy: F::zero(),
        };
        mixture.refresh();
        mixture
    }

    /// Row-wise softmax of the current logits, entropy included
    fn refresh(&mut self) {
        for n in 0..self.n_data {
            let row = self.logits.row(n);
            let max = row.fold(F::neg_infinity(), |a, &v| a.max(v));
            let log_norm = row.fold(F::zero(), |a, &v| a + F::exp(v - max)).ln() + max;
            for k in 0..self.n_components {
                let lp = self.logits[[n, k]] - log_norm;
                self.log_phi[[n, k]] = lp;
                self.phi[[n, k]] = F::exp(lp);
            }
        }
        self.entropy = -(&self.phi * &self.log_phi).sum();
    }

    /// Number of data points
    pub fn n_data(&self) -> usize {
        self.n_data
    }

    /// Number of mixture components
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Soft assignment matrix (n_data, n_components); rows sum to one
    pub fn phi(&self) -> &Array2<F> {
        &self.phi
    }

    /// Entropy of the variational assignment posterior
    pub fn entropy(&self) -> F {
        self.entropy
    }

    /// Gradient of the entropy with respect to the assignments.
    /// The row-constant part of the exact derivative is dropped as the
    /// simplex projection annihilates it.
    pub fn entropy_grad(&self) -> Array2<F> {
        self.log_phi.mapv(|v| -v)
    }

    /// Current variational parameter (flattened logits)
    pub fn variational_param(&self) -> Array1<F> {
        Array1::from_iter(self.logits.iter().cloned())
    }

    /// Install a new variational parameter (flattened logits)
    pub fn set_variational_param(&mut self, param: ArrayView1<F>) -> Result<()> {
        if param.len() != self.n_data * self.n_components {
            return Err(OmgpError::InvalidValueError(format!(
                "Variational parameter length {} does not match {} data points x {} components",
                param.len(),
                self.n_data,
                self.n_components
            )));
        }
        self.logits = param
            .to_owned()
            .into_shape((self.n_data, self.n_components))
            .unwrap();
        self.refresh();
        Ok(())
    }

    /// Expected number of points assigned to each component
    pub fn counts(&self) -> Array1<F> {
        self.phi.sum_axis(Axis(0))
    }

    /// Resize to `n_components`, dropping trailing logit columns when
    /// shrinking and appending zero logit columns when growing
    pub fn set_n_components(&mut self, n_components: usize) {
        if n_components == self.n_components {
            return;
        }
        let mut logits = Array2::zeros((self.n_data, n_components));
        let kept = n_components.min(self.n_components);
        logits
            .slice_mut(ndarray::s![.., ..kept])
            .assign(&self.logits.slice(ndarray::s![.., ..kept]));
        self.logits = logits;
        self.n_components = n_components;
        self.phi = Array2::zeros((self.n_data, n_components));
        self.log_phi = Array2::zeros((self.n_data, n_components));
        self.refresh();
    }

    /// Collapsed bound contribution of the mixing proportions under the
    /// symmetric Dirichlet prior:
    /// `lnG(K a) - K lnG(a) - lnG(K a + N) + sum_k lnG(a + counts_k)`
    pub fn mixing_prop_bound(&self) -> F {
        let alpha = self.alpha.to_f64().unwrap();
        let k = self.n_components as f64;
        let n = self.n_data as f64;
        let counts = self.counts();

        let prior = ln_gamma(k * alpha) - k * ln_gamma(alpha);
        let posterior = counts
            .iter()
            .map(|c| ln_gamma(alpha + c.to_f64().unwrap()))
            .sum::<f64>()
            - ln_gamma(k * alpha + n);
        F::cast(prior + posterior)
    }

    /// Gradient of [`mixing_prop_bound`](CollapsedMixture::mixing_prop_bound)
    /// with respect to the assignments, broadcast to (n_data, n_components)
    pub fn mixing_prop_bound_grad(&self) -> Array2<F> {
        let alpha = self.alpha.to_f64().unwrap();
        let k = self.n_components as f64;
        let n = self.n_data as f64;
        let total = digamma(k * alpha + n);

        let per_component = self
            .counts()
            .mapv(|c| F::cast(digamma(alpha + c.to_f64().unwrap()) - total));
        per_component
            .broadcast((self.n_data, self.n_components))
            .unwrap()
            .to_owned()
    }
}
