//! The `chrono_numerics` crate provides two standalone numerical building
//! blocks of a multibody-dynamics engine.
//!
//! Key components:
//! - **Quadrature**: Gauss-Legendre tables (`QuadratureTables`) and tensor-product
//!   integration over intervals, rectangles and boxes (`Quadrature`), exact for
//!   polynomials up to degree `2 * order - 1` per axis.
//! - **Numdiff**: `NumdiffLink`, a constraint link that derives `Ct`, `Cq1` and
//!   `Cq2` from a user residual `C(q, t)` by fixed-step finite differences.
//! - **Traits**: `Aggregate` (values quadrature can sum) and the integrand traits.

pub mod error;
pub mod numdiff;
pub mod quadrature;
pub mod traits;

pub use error::{NumdiffError, NumdiffResult, QuadratureError, QuadratureResult};
pub use numdiff::{
    ConstraintResidual, ConstraintTerms, DifferenceScheme, NumdiffLink, NumdiffSettings,
    ResidualFn, Unconstrained,
};
pub use quadrature::{Quadrature, QuadratureTables, TableSettings, MAX_ORDER, STATIC_ORDER_MAX};
pub use traits::{Aggregate, Integrand1D, Integrand2D, Integrand3D};
