//! This library implements the Overlapping Mixture of Gaussian Processes
//! (OMGP) model: a set of noisy observations is explained by a small number
//! of latent smooth functions, each with a
//! [Gaussian process](https://en.wikipedia.org/wiki/Gaussian_process) prior,
//! together with a soft per-point assignment of data to latent functions.
//!
//! Inference maximizes a collapsed variational lower bound on the marginal
//! likelihood: continuous kernel and noise hyperparameters move along the
//! analytic bound gradients, while the assignment posterior moves along
//! natural-gradient directions respecting the probability simplex. This is
//! the data-association setting of Lázaro-Gredilla et al. (2012): several
//! overlapping trajectories observed through one unlabeled channel.
//!
//! The model is implemented by [Omgp] parameterized by [OmgpParams].
//! Covariance functions of the latent processes live in
//! [covariance_models]; the collapsed assignment machinery is
//! [CollapsedMixture].
//!
//! All dense linear algebra is in `O(n^3)` per component and per bound or
//! gradient evaluation; no sparse approximation is attempted.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
pub mod covariance_models;
mod errors;
mod mixture;
mod optimization;
mod parameters;
mod utils;

pub use algorithm::*;
pub use errors::*;
pub use mixture::*;
pub use parameters::*;
pub use utils::pairwise_sq_dists;
