use crate::covariance_models::CovarianceFunction;
use crate::errors::{OmgpError, Result};
use linfa::{Float, ParamGuard};

/// Default number of outer optimization rounds
pub const OMGP_MAX_ITER: usize = 50;
/// Default number of natural-gradient steps per round
pub const OMGP_MAX_VB_ITER: usize = 25;
/// Default number of hyperparameter ascent steps per round
pub const OMGP_MAX_HYPER_ITER: usize = 15;

/// A set of validated OMGP parameters.
#[derive(Clone)]
pub struct OmgpValidParams<F: Float> {
    /// Number of latent processes
    pub(crate) n_components: usize,
    /// Covariance prototypes, one per component; `None` selects a default
    /// squared exponential per component
    pub(crate) kernels: Option<Vec<Box<dyn CovarianceFunction<F>>>>,
    /// Initial shared observation noise variance
    pub(crate) variance: F,
    /// Concentration of the symmetric Dirichlet prior over assignments
    pub(crate) alpha: F,
    /// Max number of outer optimization rounds
    pub(crate) max_iter: usize,
    /// Max number of natural-gradient steps per round
    pub(crate) max_vb_iter: usize,
    /// Max number of hyperparameter ascent steps per round
    pub(crate) max_hyper_iter: usize,
    /// Relative bound improvement under which the fit is considered converged
    pub(crate) ftol: F,
    /// Seed for the assignment initialization
    pub(crate) seed: Option<u64>,
}

impl<F: Float> Default for OmgpValidParams<F> {
    fn default() -> OmgpValidParams<F> {
        OmgpValidParams {
            n_components: 2,
            kernels: None,
            variance: F::one(),
            alpha: F::one(),
            max_iter: OMGP_MAX_ITER,
            max_vb_iter: OMGP_MAX_VB_ITER,
            max_hyper_iter: OMGP_MAX_HYPER_ITER,
            ftol: F::cast(1e-6),
            seed: None,
        }
    }
}

impl<F: Float> OmgpValidParams<F> {
    /// Number of latent processes
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Initial shared observation noise variance
    pub fn initial_variance(&self) -> F {
        self.variance
    }

    /// Dirichlet concentration of the assignment prior
    pub fn alpha(&self) -> F {
        self.alpha
    }

    /// Convergence tolerance on the bound
    pub fn ftol(&self) -> F {
        self.ftol
    }
}

/// The set of hyperparameters that can be specified for the execution of
/// the [OMGP algorithm](crate::Omgp).
#[derive(Clone)]
pub struct OmgpParams<F: Float>(OmgpValidParams<F>);

impl<F: Float> Default for OmgpParams<F> {
    fn default() -> OmgpParams<F> {
        OmgpParams(OmgpValidParams::default())
    }
}

impl<F: Float> OmgpParams<F> {
    /// A constructor for OMGP parameters with default values
    pub fn new() -> OmgpParams<F> {
        Self::default()
    }

    /// Set the number of latent processes
    pub fn n_components(mut self, n_components: usize) -> Self {
        self.0.n_components = n_components;
        self
    }

    /// Set the covariance prototypes, one per component
    pub fn kernels(mut self, kernels: Vec<Box<dyn CovarianceFunction<F>>>) -> Self {
        self.0.kernels = Some(kernels);
        self
    }

    /// Set the initial shared observation noise variance
    pub fn variance(mut self, variance: F) -> Self {
        self.0.variance = variance;
        self
    }

    /// Set the Dirichlet concentration of the assignment prior
    pub fn alpha(mut self, alpha: F) -> Self {
        self.0.alpha = alpha;
        self
    }

    /// Set the max number of outer optimization rounds
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.0.max_iter = max_iter;
        self
    }

    /// Set the max number of natural-gradient steps per round
    pub fn max_vb_iter(mut self, max_vb_iter: usize) -> Self {
        self.0.max_vb_iter = max_vb_iter;
        self
    }

    /// Set the max number of hyperparameter ascent steps per round
    pub fn max_hyper_iter(mut self, max_hyper_iter: usize) -> Self {
        self.0.max_hyper_iter = max_hyper_iter;
        self
    }

    /// Set the convergence tolerance on the bound
    pub fn ftol(mut self, ftol: F) -> Self {
        self.0.ftol = ftol;
        self
    }

    /// Set the seed of the assignment initialization
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.0.seed = seed;
        self
    }
}

impl<F: Float> ParamGuard for OmgpParams<F> {
    type Checked = OmgpValidParams<F>;
    type Error = OmgpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.n_components == 0 {
            return Err(OmgpError::InvalidValueError(
                "`n_components` cannot be 0!".to_string(),
            ));
        }
        if self.0.variance <= F::zero() {
            return Err(OmgpError::InvalidValueError(format!(
                "Noise variance should be strictly positive, got {}",
                self.0.variance
            )));
        }
        if self.0.alpha <= F::zero() {
            return Err(OmgpError::InvalidValueError(format!(
                "Dirichlet concentration should be strictly positive, got {}",
                self.0.alpha
            )));
        }
        if let Some(kernels) = &self.0.kernels {
            if kernels.len() != self.0.n_components {
                return Err(OmgpError::InvalidValueError(format!(
                    "{} kernels given for {} components",
                    kernels.len(),
                    self.0.n_components
                )));
            }
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// Softplus reparameterization mapping an unconstrained optimization variable
/// to a strictly positive value, `v = ln(1 + exp(u))`.
pub(crate) fn from_unconstrained<F: Float>(u: F) -> F {
    if u > F::cast(35.) {
        u
    } else {
        u.exp().ln_1p()
    }
}

/// Inverse of [`from_unconstrained`], `u = ln(exp(v) - 1)`.
pub(crate) fn to_unconstrained<F: Float>(v: F) -> F {
    if v > F::cast(35.) {
        v
    } else {
        v.exp_m1().ln()
    }
}

/// Chain-rule factor `dv/du = 1 - exp(-v)` turning a gradient with respect to
/// the positive value into a gradient with respect to its unconstrained
/// parameterization.
pub(crate) fn unconstrained_grad_factor<F: Float>(v: F) -> F {
    F::one() - (-v).exp()
}
