use crate::covariance_models::{CovarianceFunction, SquaredExponentialCov};
use crate::errors::{OmgpError, Result};
use crate::mixture::CollapsedMixture;
use crate::optimization::optimize;
use crate::parameters::{
    from_unconstrained, to_unconstrained, unconstrained_grad_factor, OmgpParams, OmgpValidParams,
};
use crate::utils::{cho_solve, chol_log_det, qr_solve, spd_inverse, spd_inverse_from_chol, tdot};

use linfa::prelude::{DatasetBase, Fit, Float};
use linfa_linalg::cholesky::*;
use ndarray::{s, Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix2};
use ndarray_rand::rand::SeedableRng;
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use std::fmt;

/// Floor added to responsibilities wherever they appear in a precision
/// denominator, so a vanishing assignment cannot make the per-component
/// system singular. Prediction deliberately does not apply it: a component
/// nothing is assigned to has a genuinely singular noise model there.
pub(crate) const ASSIGN_FLOOR: f64 = 1e-6;

/// Overlapping mixture of Gaussian processes.
///
/// The model explains the observations `(X, Y)` as draws from one of
/// `n_components` latent functions, each with a Gaussian process prior given
/// by its own covariance function, sharing a single observation noise
/// variance. Assignments of data points to latent functions are soft and
/// inferred variationally: the collapsed lower bound on the marginal
/// likelihood is ascended alternately in the continuous hyperparameters
/// (noise variance and covariance parameters, by gradient ascent) and in the
/// assignment posterior (by natural-gradient steps on the simplex).
///
/// # Implementation
///
/// * Based on [ndarray](https://github.com/rust-ndarray/ndarray)
///   and [linfa](https://github.com/rust-ml/linfa) with
///   [linfa-linalg](https://github.com/rust-ml/linfa-linalg) decompositions.
/// * Every operation recomputes its per-component systems from the current
///   parameters; nothing is cached across calls, so there is no staleness
///   hazard at the cost of redundant dense solves.
/// * A Cholesky factorization failure is reported as an error right away;
///   the model never substitutes a fallback decomposition.
///
/// # Example
///
/// ```no_run
/// use linfa::prelude::*;
/// use ndarray::{Array, Axis};
/// use omgp::Omgp;
///
/// // two latent trajectories observed through a common noisy channel
/// let xt = Array::linspace(0., 4., 30).insert_axis(Axis(1));
/// let yt = xt.mapv(|v: f64| v.sin());
///
/// let model = Omgp::params()
///     .n_components(2)
///     .seed(Some(42))
///     .fit(&Dataset::new(xt.clone(), yt))
///     .expect("OMGP fitted");
///
/// let (means, variances) = model.predict_components(&xt).expect("OMGP prediction");
/// ```
///
/// # Reference
///
/// Lázaro-Gredilla, M., Van Vaerenbergh, S., Lawrence, N. D.,
/// [Overlapping Mixtures of Gaussian Processes for the data association problem](https://doi.org/10.1016/j.patcog.2011.10.004),
/// Pattern Recognition, Volume 45, Issue 4, 2012.
pub struct Omgp<F: Float> {
    /// Training inputs (n, nx)
    x: Array2<F>,
    /// Training outputs (n, ny)
    y: Array2<F>,
    /// One covariance function per latent process
    kernels: Vec<Box<dyn CovarianceFunction<F>>>,
    /// Shared observation noise variance
    variance: F,
    /// Gradient of the bound wrt the noise variance, set by
    /// [`update_kern_grads`](Omgp::update_kern_grads)
    variance_grad: F,
    /// Collapsed variational assignment state
    mixture: CollapsedMixture<F>,
    /// Parameters used to build this model
    params: OmgpValidParams<F>,
}

impl<F: Float> Clone for Omgp<F> {
    fn clone(&self) -> Self {
        Self {
            x: self.x.to_owned(),
            y: self.y.to_owned(),
            kernels: self.kernels.clone(),
            variance: self.variance,
            variance_grad: self.variance_grad,
            mixture: self.mixture.clone(),
            params: self.params.clone(),
        }
    }
}

impl<F: Float> fmt::Display for Omgp<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kerns = self
            .kernels
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "OMGP(n_components={}, variance={}, kernels=[{}])",
            self.n_components(),
            self.variance,
            kerns
        )
    }
}

impl<F: Float> Omgp<F> {
    /// OMGP parameters constructor
    pub fn params() -> OmgpParams<F> {
        OmgpParams::new()
    }

    /// Build an unfitted model over the given observations.
    /// Assignments are initialized from the parameterized seed; kernels
    /// default to one squared exponential per component when none are given.
    pub fn new(params: OmgpValidParams<F>, x: Array2<F>, y: Array2<F>) -> Result<Omgp<F>> {
        if x.nrows() == 0 {
            return Err(OmgpError::InvalidValueError(
                "Empty training set".to_string(),
            ));
        }
        if x.nrows() != y.nrows() {
            return Err(OmgpError::InvalidValueError(format!(
                "Number of input points {} does not match number of output points {}",
                x.nrows(),
                y.nrows()
            )));
        }

        let mut rng = match params.seed {
            Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
            None => Xoshiro256Plus::from_entropy(),
        };
        let mixture = CollapsedMixture::new(x.nrows(), params.n_components, params.alpha, &mut rng);
        let kernels = match &params.kernels {
            Some(kernels) => kernels.clone(),
            None => (0..params.n_components)
                .map(|_| {
                    Box::new(SquaredExponentialCov::default()) as Box<dyn CovarianceFunction<F>>
                })
                .collect(),
        };

        let mut model = Omgp {
            variance: params.variance,
            variance_grad: F::zero(),
            x,
            y,
            kernels,
            mixture,
            params,
        };
        model.reconcile_components();
        Ok(model)
    }

    /// Number of mixture components
    pub fn n_components(&self) -> usize {
        self.mixture.n_components()
    }

    /// Shared observation noise variance
    pub fn variance(&self) -> F {
        self.variance
    }

    /// Gradient of the bound wrt the noise variance as last accumulated by
    /// [`update_kern_grads`](Omgp::update_kern_grads)
    pub fn variance_gradient(&self) -> F {
        self.variance_grad
    }

    /// Soft assignment matrix (n, n_components)
    pub fn phi(&self) -> &Array2<F> {
        self.mixture.phi()
    }

    /// Covariance functions of the latent processes
    pub fn kernels(&self) -> &[Box<dyn CovarianceFunction<F>>] {
        &self.kernels
    }

    /// Most probable component for each data point
    pub fn hard_assignments(&self) -> Array1<usize> {
        Array1::from_iter(
            self.mixture
                .phi()
                .rows()
                .into_iter()
                .map(|r| r.argmax().unwrap()),
        )
    }

    /// Current variational parameter (flattened assignment logits)
    pub fn variational_param(&self) -> Array1<F> {
        self.mixture.variational_param()
    }

    /// Install a new variational parameter (flattened assignment logits)
    pub fn set_variational_param(&mut self, param: ArrayView1<F>) -> Result<()> {
        self.mixture.set_variational_param(param)
    }

    /// Change the number of latent processes, reconciling the kernel list
    pub fn set_n_components(&mut self, n_components: usize) {
        self.mixture.set_n_components(n_components);
        self.reconcile_components();
    }

    /// Bring the kernel list to exactly `n_components` entries: grow by
    /// cloning the last covariance function as a fresh independently-owned
    /// copy, shrink by dropping trailing entries. No-op when already
    /// reconciled.
    pub fn reconcile_components(&mut self) {
        let target = self.mixture.n_components();
        while self.kernels.len() < target {
            let copy = self.kernels.last().unwrap().clone();
            self.kernels.push(copy);
        }
        self.kernels.truncate(target);
    }

    /// Per-component system matrix `K_i(X) + diag(variance / (phi[:, i] + floor))`
    fn system(&self, component: usize, floor: F) -> Array2<F> {
        let b_inv = self
            .mixture
            .phi()
            .column(component)
            .mapv(|p| self.variance / (p + floor));
        self.kernels[component].value_self(self.x.view()) + Array2::from_diag(&b_inv)
    }

    /// Bound contribution of one latent process: data fit, complexity
    /// penalty and the responsibility-weighted noise normalizing constant
    fn component_bound(&self, component: usize) -> Result<F> {
        let half = F::cast(0.5);
        let kb = self.system(component, F::cast(ASSIGN_FLOOR));
        let l = kb.cholesky()?;
        let alpha = cho_solve(&l, &self.y.view())?;

        let data_fit = -half * self.y.t().dot(&alpha).diag().sum();
        let penalty = -half * chol_log_det(&l);
        let two_pi = F::cast(2. * std::f64::consts::PI);
        let constant = -half
            * self.mixture.phi().column(component).sum()
            * (two_pi * self.variance).ln();
        Ok(data_fit + penalty + constant)
    }

    /// Collapsed variational lower bound on the marginal likelihood,
    /// conditioned on the current hyperparameters and assignments.
    /// Fails when a per-component system is not positive-definite.
    pub fn bound(&self) -> Result<F> {
        let gp_bound = (0..self.n_components())
            .into_par_iter()
            .map(|i| self.component_bound(i))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .fold(F::zero(), |acc, term| acc + term);
        Ok(gp_bound + self.mixture.mixing_prop_bound() + self.mixture.entropy())
    }

    /// Accumulate the gradient of the bound on every covariance function and
    /// on the shared noise variance.
    ///
    /// Each kernel receives `dL/dK_i = 0.5 (alpha alpha^t - (K_i + B_inv_i)^-1)`
    /// and is responsible for chaining it onto its own hyperparameters. The
    /// noise gradient is accumulated across components and assigned to the
    /// variance gradient slot as a running sum on every pass.
    pub fn update_kern_grads(&mut self) -> Result<()> {
        let half = F::cast(0.5);
        let floor = F::cast(ASSIGN_FLOOR);
        let x = self.x.view();
        let y = self.y.view();
        let variance = self.variance;
        let phi = self.mixture.phi();

        self.kernels
            .par_iter_mut()
            .enumerate()
            .map(|(i, kern)| -> Result<()> {
                let b_inv = phi.column(i).mapv(|p| variance / (p + floor));
                let kb = kern.value_self(x) + Array2::from_diag(&b_inv);
                let l = kb.cholesky()?;
                let alpha = cho_solve(&l, &y)?;
                let kb_inv = spd_inverse_from_chol(&l)?;

                let dl_dk = (tdot(&alpha) - kb_inv).mapv(|v| half * v);
                kern.update_gradients_full(dl_dk.view(), x);
                Ok(())
            })
            .collect::<Result<Vec<_>>>()?;

        // shared noise variance gradient
        let mut grad_variance = F::zero();
        for i in 0..self.n_components() {
            let kb = self.system(i, floor);
            let alpha = qr_solve(&kb, &self.y.view())?;
            let kb_inv = spd_inverse(&kb)?;
            let dl_db = tdot(&alpha) - kb_inv;

            let phi_col = self.mixture.phi().column(i);
            let grad_b_inv = phi_col.mapv(|p| F::one() / (p + floor));
            grad_variance = grad_variance
                + half * (dl_db.diag().to_owned() * grad_b_inv).sum()
                - half * phi_col.sum() / self.variance;
            self.variance_grad = grad_variance;
        }
        Ok(())
    }

    /// Gradient and natural gradient of the bound with respect to the
    /// variational assignments, both flattened to length `n * n_components`.
    ///
    /// The natural gradient is the raw assignment gradient projected onto
    /// the tangent space of the simplex (row-wise removal of the component
    /// along `phi`); the ordinary gradient returned first is the natural
    /// gradient rescaled element-wise by `phi`, which is the plain gradient
    /// in logit space.
    pub fn vb_grad_natgrad(&self) -> Result<(Array1<F>, Array1<F>)> {
        let half = F::cast(0.5);
        let floor = F::cast(ASSIGN_FLOOR);
        let n = self.x.nrows();
        let k = self.n_components();
        let phi = self.mixture.phi();
        let variance = self.variance;

        let columns = (0..k)
            .into_par_iter()
            .map(|i| -> Result<Array1<F>> {
                let kb = self.system(i, floor);
                let alpha = qr_solve(&kb, &self.y.view())?;
                let kb_inv = spd_inverse(&kb)?;
                let dl_db = tdot(&alpha) - kb_inv;

                // one-hot perturbations of B_inv reduce the trace to the
                // diagonal entry of dL/dB scaled by the precision derivative
                let phi_col = phi.column(i);
                let mut col = Array1::zeros(n);
                for j in 0..n {
                    let dprec = -variance / (phi_col[j] * phi_col[j] + floor);
                    col[j] = half * dl_db[[j, j]] * dprec;
                }
                Ok(col)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut grad_lm = Array2::zeros((n, k));
        for (i, col) in columns.iter().enumerate() {
            grad_lm.column_mut(i).assign(col);
        }

        let grad_phi = grad_lm + self.mixture.mixing_prop_bound_grad() + self.mixture.entropy_grad();
        let row_proj = (phi * &grad_phi).sum_axis(Axis(1)).insert_axis(Axis(1));
        let natgrad = grad_phi - row_proj;
        let grad = &natgrad * phi;

        Ok((
            grad.into_shape(n * k).unwrap(),
            natgrad.into_shape(n * k).unwrap(),
        ))
    }

    /// Predictive mean and covariance of one latent process at new inputs.
    ///
    /// Means come as a (n_new, ny) matrix, the covariance as a full
    /// (n_new, n_new) matrix. The responsibilities enter the noise model
    /// unfloored here: a component whose responsibility column is entirely
    /// zero has a singular noise precision and yields non-finite output or a
    /// decomposition error rather than a made-up finite answer.
    pub fn predict(
        &self,
        xnew: &ArrayBase<impl Data<Elem = F>, Ix2>,
        component: usize,
    ) -> Result<(Array2<F>, Array2<F>)> {
        if component >= self.n_components() {
            return Err(OmgpError::InvalidValueError(format!(
                "Component index {} out of range for {} components",
                component,
                self.n_components()
            )));
        }
        if xnew.ncols() != self.x.ncols() {
            return Err(OmgpError::InvalidValueError(format!(
                "Prediction input dimension {} does not match training dimension {}",
                xnew.ncols(),
                self.x.ncols()
            )));
        }

        let kern = &self.kernels[component];
        let kb = self.system(component, F::zero());
        let kx = kern.value(self.x.view(), xnew.view());

        let mu = kx.t().dot(&qr_solve(&kb, &self.y.view())?);

        let kxx = kern.value_self(xnew.view());
        let va = (kxx - kx.t().dot(&qr_solve(&kb, &kx.view())?)).mapv(|v| v + self.variance);

        Ok((mu, va))
    }

    /// Predictive means and variances of every latent process at new inputs,
    /// stacked as two (n_new, n_components) matrices. Variances are the
    /// diagonals of the per-component predictive covariances; means keep the
    /// first output dimension. Stops at the first failing component.
    pub fn predict_components(
        &self,
        xnew: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array2<F>, Array2<F>)> {
        let k = self.n_components();
        let mut means = Array2::zeros((xnew.nrows(), k));
        let mut variances = Array2::zeros((xnew.nrows(), k));
        for i in 0..k {
            let (mu, va) = self.predict(xnew, i)?;
            means.column_mut(i).assign(&mu.column(0));
            variances.column_mut(i).assign(&va.diag());
        }
        Ok((means, variances))
    }

    /// Maximize the bound by alternating natural-gradient ascent on the
    /// assignments with gradient ascent on the hyperparameters.
    /// Returns the per-round bound trace.
    pub fn optimize(&mut self) -> Result<Vec<F>> {
        optimize(self)
    }

    pub(crate) fn opt_params(&self) -> &OmgpValidParams<F> {
        &self.params
    }

    /// Trainable continuous parameters, flattened in unconstrained space:
    /// `[variance, kernel_0 params.., kernel_1 params.., ..]`
    pub(crate) fn hyper_values(&self) -> Array1<F> {
        let mut values = vec![to_unconstrained(self.variance)];
        for kern in &self.kernels {
            values.extend(kern.params().iter().map(|&v| to_unconstrained(v)));
        }
        Array1::from_vec(values)
    }

    /// Install trainable continuous parameters from unconstrained space
    pub(crate) fn set_hyper_values(&mut self, values: ArrayView1<F>) {
        self.variance = from_unconstrained(values[0]);
        let mut offset = 1;
        for kern in &mut self.kernels {
            let n = kern.n_params();
            let natural = values
                .slice(s![offset..offset + n])
                .mapv(from_unconstrained);
            kern.set_params(natural.view());
            offset += n;
        }
    }

    /// Gradient of the bound in unconstrained space, matching
    /// [`hyper_values`](Omgp::hyper_values); valid after
    /// [`update_kern_grads`](Omgp::update_kern_grads)
    pub(crate) fn hyper_grads(&self) -> Array1<F> {
        let mut grads = vec![self.variance_grad * unconstrained_grad_factor(self.variance)];
        for kern in &self.kernels {
            let params = kern.params();
            grads.extend(
                kern.gradient()
                    .iter()
                    .zip(params.iter())
                    .map(|(&g, &v)| g * unconstrained_grad_factor(v)),
            );
        }
        Array1::from_vec(grads)
    }
}

impl<F: Float, D: Data<Elem = F>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix2>, OmgpError>
    for OmgpValidParams<F>
{
    type Object = Omgp<F>;

    /// Fit the OMGP model by maximizing the collapsed variational bound
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix2>>,
    ) -> Result<Self::Object> {
        let mut model = Omgp::new(
            self.clone(),
            dataset.records().to_owned(),
            dataset.targets().to_owned(),
        )?;
        model.optimize()?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use finitediff::FiniteDiff;
    use linfa::prelude::Dataset;
    use linfa::ParamGuard;
    use ndarray::{arr1, array, Array};
    use ndarray_npy::write_npy;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use std::cell::RefCell;

    /// Two latent trajectories observed through a common noisy channel,
    /// points interleaved so neither component owns a contiguous block
    fn make_two_trajectories(
        n_each: usize,
        noise_std: f64,
        rng: &mut Xoshiro256Plus,
    ) -> (Array2<f64>, Array2<f64>, Vec<usize>) {
        let grid = Array::linspace(0f64, 4., n_each);
        let noise = Array::<f64, _>::random_using(
            (2 * n_each,),
            Normal::new(0., noise_std.max(f64::EPSILON)).unwrap(),
            rng,
        );

        let mut x = Array2::zeros((2 * n_each, 1));
        let mut y = Array2::zeros((2 * n_each, 1));
        let mut labels = Vec::with_capacity(2 * n_each);
        for (j, &v) in grid.iter().enumerate() {
            x[[2 * j, 0]] = v;
            y[[2 * j, 0]] = 2. * v.sin() + noise[2 * j];
            labels.push(0);
            x[[2 * j + 1, 0]] = v;
            y[[2 * j + 1, 0]] = -2. * v.sin() + noise[2 * j + 1];
            labels.push(1);
        }
        (x, y, labels)
    }

    fn small_model(n: usize, k: usize, seed: u64) -> Omgp<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let (x, y, _) = make_two_trajectories(n / 2, 0.1, &mut rng);
        let params = Omgp::params()
            .n_components(k)
            .seed(Some(seed))
            .check()
            .unwrap();
        Omgp::new(params, x, y).unwrap()
    }

    #[test]
    fn test_bound_is_finite() {
        let mut model = small_model(20, 2, 42);
        // uniform soft assignment
        model.set_variational_param(Array1::zeros(40).view()).unwrap();
        let bound = model.bound().unwrap();
        assert!(bound.is_finite(), "bound = {bound}");
    }

    #[test]
    fn test_variance_gradient_matches_finite_difference() {
        let mut model = small_model(12, 2, 3);
        model.update_kern_grads().unwrap();
        let grad = model.variance_gradient();

        let shared = RefCell::new(model);
        let f = |p: &Array1<f64>| {
            let mut m = shared.borrow_mut();
            m.variance = p[0];
            m.bound().unwrap()
        };
        let v0 = shared.borrow().variance();
        let fd = arr1(&[v0]).central_diff(&f)[0];
        assert!(
            (grad - fd).abs() <= 1e-4 * grad.abs().max(1.0),
            "grad = {grad}, fd = {fd}"
        );
    }

    #[test]
    fn test_kernel_gradients_match_finite_difference() {
        let mut model = small_model(12, 2, 5);
        model.update_kern_grads().unwrap();

        for i in 0..2 {
            let grad = model.kernels[i].gradient();
            let p0 = model.kernels[i].params();

            let shared = RefCell::new(model.clone());
            let f = |p: &Array1<f64>| {
                let mut m = shared.borrow_mut();
                m.kernels[i].set_params(p.view());
                m.bound().unwrap()
            };
            let fd = p0.central_diff(&f);
            for j in 0..2 {
                assert!(
                    (grad[j] - fd[j]).abs() <= 1e-4 * grad[j].abs().max(1.0),
                    "kernel {i} param {j}: grad = {}, fd = {}",
                    grad[j],
                    fd[j]
                );
            }
        }
    }

    #[test]
    fn test_natural_gradient_is_simplex_tangent() {
        let model = small_model(20, 2, 11);
        let (grad, natgrad) = model.vb_grad_natgrad().unwrap();
        assert_eq!(grad.len(), 40);
        assert_eq!(natgrad.len(), 40);

        let natgrad = natgrad.into_shape((20, 2)).unwrap();
        let scale = natgrad.mapv(|v| v.abs()).fold(0., |a: f64, &b| a.max(b));
        let row_dots = (model.phi() * &natgrad).sum_axis(Axis(1));
        for &d in row_dots.iter() {
            assert!(d.abs() <= 1e-9 * scale.max(1.0), "row dot = {d}");
        }
    }

    #[test]
    fn test_reconcile_components() {
        let mut model = small_model(10, 2, 0);
        assert_eq!(model.kernels().len(), 2);

        model.set_n_components(4);
        assert_eq!(model.kernels().len(), 4);
        assert_eq!(model.phi().dim(), (10, 4));

        // idempotent
        model.reconcile_components();
        assert_eq!(model.kernels().len(), 4);

        model.set_n_components(2);
        assert_eq!(model.kernels().len(), 2);
        assert_eq!(model.phi().dim(), (10, 2));
    }

    #[test]
    fn test_noiseless_single_gp_interpolates() {
        let x = Array::linspace(0., 3., 8).insert_axis(Axis(1));
        let y = x.mapv(|v: f64| v.sin());
        let params = Omgp::params()
            .n_components(1)
            .variance(1e-8)
            .seed(Some(1))
            .check()
            .unwrap();
        let model = Omgp::new(params, x.clone(), y.clone()).unwrap();

        // single component: every point fully assigned
        assert_abs_diff_eq!(
            model.phi().to_owned(),
            Array2::from_elem((8, 1), 1.0),
            epsilon = 1e-12
        );

        let (mu, va) = model.predict(&x, 0).unwrap();
        assert_abs_diff_eq!(mu, y, epsilon = 1e-3);
        for &v in va.diag().iter() {
            assert!(v.abs() < 1e-2, "predictive variance {v} not near zero");
        }
    }

    #[test]
    fn test_degenerate_responsibility_column() {
        let mut model = small_model(10, 2, 9);
        // drive the second column to an exact numerical zero
        let mut logits = Array2::zeros((10, 2));
        logits.column_mut(1).fill(-1e4);
        model
            .set_variational_param(logits.into_shape(20).unwrap().view())
            .unwrap();
        assert!(model.phi().column(1).iter().all(|&v| v == 0.));

        let xnew = array![[0.5], [1.5]];
        match model.predict(&xnew, 1) {
            Ok((mu, _)) => assert!(
                mu.iter().any(|v| !v.is_finite()),
                "degenerate component produced a plausible finite prediction"
            ),
            Err(_) => (),
        }
    }

    #[test]
    fn test_predict_rejects_bad_inputs() {
        let model = small_model(10, 2, 2);
        let xnew = array![[0.5, 1.0]];
        assert!(matches!(
            model.predict(&xnew, 0),
            Err(OmgpError::InvalidValueError(_))
        ));
        let xnew = array![[0.5]];
        assert!(matches!(
            model.predict(&xnew, 5),
            Err(OmgpError::InvalidValueError(_))
        ));
    }

    #[test]
    fn test_new_rejects_mismatched_shapes() {
        let params = Omgp::<f64>::params().check().unwrap();
        let x = Array2::zeros((5, 1));
        let y = Array2::zeros((4, 1));
        assert!(matches!(
            Omgp::new(params, x, y),
            Err(OmgpError::InvalidValueError(_))
        ));
    }

    #[test]
    fn test_fit_separates_overlapping_processes() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let (x, y, labels) = make_two_trajectories(20, 0.05, &mut rng);

        let params = Omgp::params()
            .n_components(2)
            .max_iter(10)
            .seed(Some(42))
            .check()
            .unwrap();
        let mut model = Omgp::new(params, x.clone(), y.clone()).unwrap();
        let trace = model.optimize().unwrap();

        // accepted steps only: the bound trace never decreases
        for w in trace.windows(2) {
            assert!(w[1] >= w[0] - 1e-9, "bound decreased: {} -> {}", w[0], w[1]);
        }
        assert!(
            trace.last().unwrap() > trace.first().unwrap(),
            "optimization did not improve the bound"
        );

        // assignments stay on the simplex
        let row_sums = model.phi().sum_axis(Axis(1));
        assert_abs_diff_eq!(row_sums, Array1::from_elem(40, 1.0), epsilon = 1e-9);
        assert!(model.phi().iter().all(|&v| v >= 0.));

        // responsibilities separate the two trajectories (up to label swap)
        let assigned = model.hard_assignments();
        let agree = assigned
            .iter()
            .zip(labels.iter())
            .filter(|(a, b)| a == b)
            .count() as f64
            / labels.len() as f64;
        let accuracy = agree.max(1. - agree);
        assert!(accuracy >= 0.75, "separation accuracy {accuracy}");

        // per-component predictions are finite over the input range
        let xplot = Array::linspace(0., 4., 50).insert_axis(Axis(1));
        let (means, variances) = model.predict_components(&xplot).unwrap();
        assert_eq!(means.dim(), (50, 2));
        assert_eq!(variances.dim(), (50, 2));
        assert!(means.iter().all(|v| v.is_finite()));
        assert!(variances.iter().all(|v| v.is_finite()));

        let test_dir = "target/tests";
        std::fs::create_dir_all(test_dir).ok();
        write_npy(format!("{test_dir}/omgp_xt.npy"), &x).expect("xt saved");
        write_npy(format!("{test_dir}/omgp_yt.npy"), &y).expect("yt saved");
        write_npy(format!("{test_dir}/omgp_means.npy"), &means).expect("means saved");
        write_npy(format!("{test_dir}/omgp_vars.npy"), &variances).expect("vars saved");
    }

    #[test]
    fn test_fit_trait_entry_point() {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let (x, y, _) = make_two_trajectories(10, 0.1, &mut rng);
        let model = Omgp::params()
            .n_components(2)
            .max_iter(3)
            .seed(Some(7))
            .fit(&Dataset::new(x, y))
            .expect("OMGP fitted");
        assert_eq!(model.n_components(), 2);
        assert!(model.bound().unwrap().is_finite());
    }
}
