use thiserror::Error;

/// A result type for OMGP computations
pub type Result<T> = std::result::Result<T, OmgpError>;

/// An error raised when building or fitting an [`Omgp`](crate::Omgp) model
#[derive(Error, Debug)]
pub enum OmgpError {
    /// When linear algebra computation fails, typically a Cholesky
    /// factorization of a matrix which is not positive-definite
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
}
