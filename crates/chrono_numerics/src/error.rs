//! Error types for quadrature and numerically differentiated links.

use thiserror::Error;

/// Errors raised while building Gauss-Legendre tables or integrating.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QuadratureError {
    /// Quadrature orders lie in `1..=MAX_ORDER`.
    #[error("Invalid quadrature order {order}: must be in 1..={max}", max = crate::quadrature::MAX_ORDER)]
    InvalidOrder { order: usize },

    #[error("Invalid table range {from}..={to}: upper order must not be below lower order")]
    InvalidRange { from: usize, to: usize },

    /// Newton polishing of a Legendre root did not reach the tolerance.
    #[error("Legendre root {index} of order {order} did not converge after {iterations} Newton steps")]
    RootNotConverged {
        order: usize,
        index: usize,
        iterations: usize,
    },

    #[error("Invalid table settings: {0}")]
    InvalidSettings(String),
}

/// Result type for quadrature operations.
pub type QuadratureResult<T> = std::result::Result<T, QuadratureError>;

/// Errors raised by [`NumdiffLink`](crate::numdiff::NumdiffLink).
#[derive(Debug, Error)]
pub enum NumdiffError {
    /// A coordinate or residual vector has the wrong length for the link layout.
    #[error("{what} dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// The residual was requested before any state was imposed on the bodies.
    #[error("Constraint residual evaluated before any state was imposed")]
    StateNotImposed,

    #[error("Invalid differentiation settings: {0}")]
    InvalidSettings(String),

    /// A user hook (residual, analytic derivative or body update) failed.
    #[error("Constraint evaluation failed: {0}")]
    Residual(#[from] anyhow::Error),
}

/// Result type for numerical differentiation operations.
pub type NumdiffResult<T> = std::result::Result<T, NumdiffError>;
