//! Fixed-step finite-difference kernels for `Ct` and `Cq`.
//!
//! Every kernel perturbs the bodies through
//! [`LinkCoordinates::impose_coords`] and re-imposes the nominal `(q, t)`
//! before returning, whether or not the evaluation succeeded.

use nalgebra::{DMatrix, DVector};

use super::body::LinkCoordinates;
use super::{ConstraintResidual, DifferenceScheme, NumdiffSettings};
use crate::error::{NumdiffError, NumdiffResult};

/// Estimates `Ct = dC/dt` at `(q, t)`. `c` is the residual already
/// evaluated at `(q, t)`.
pub fn time_derivative<S, R>(
    residual: &mut R,
    coords: &mut S,
    q: &DVector<f64>,
    t: f64,
    c: &DVector<f64>,
    settings: &NumdiffSettings,
) -> NumdiffResult<DVector<f64>>
where
    S: LinkCoordinates + ?Sized,
    R: ConstraintResidual<S> + ?Sized,
{
    let h = settings.step;
    let outcome = match settings.scheme {
        DifferenceScheme::Forward => {
            evaluate_at(residual, coords, q, t + h).map(|c_plus| (c_plus - c) / h)
        }
        DifferenceScheme::Central => evaluate_at(residual, coords, q, t + h).and_then(|c_plus| {
            let c_minus = evaluate_at(residual, coords, q, t - h)?;
            Ok((c_plus - c_minus) / (2.0 * h))
        }),
    };
    restore(coords, q, t, outcome)
}

/// Estimates the full Jacobian `dC/dq` at `(q, t)`, one column per
/// coordinate. `c` is the residual already evaluated at `(q, t)`.
pub fn jacobian<S, R>(
    residual: &mut R,
    coords: &mut S,
    q: &DVector<f64>,
    t: f64,
    c: &DVector<f64>,
    settings: &NumdiffSettings,
) -> NumdiffResult<DMatrix<f64>>
where
    S: LinkCoordinates + ?Sized,
    R: ConstraintResidual<S> + ?Sized,
{
    let outcome = jacobian_columns(residual, coords, q, t, c, settings);
    restore(coords, q, t, outcome)
}

fn jacobian_columns<S, R>(
    residual: &mut R,
    coords: &mut S,
    q: &DVector<f64>,
    t: f64,
    c: &DVector<f64>,
    settings: &NumdiffSettings,
) -> NumdiffResult<DMatrix<f64>>
where
    S: LinkCoordinates + ?Sized,
    R: ConstraintResidual<S> + ?Sized,
{
    let h = settings.step;
    let mut cq = DMatrix::zeros(c.len(), q.len());
    let mut perturbed = q.clone();

    for j in 0..q.len() {
        let qj = q[j];
        let column = match settings.scheme {
            DifferenceScheme::Forward => {
                perturbed[j] = qj + h;
                let c_plus = evaluate_at(residual, coords, &perturbed, t)?;
                (c_plus - c) / h
            }
            DifferenceScheme::Central => {
                perturbed[j] = qj + h;
                let c_plus = evaluate_at(residual, coords, &perturbed, t)?;
                perturbed[j] = qj - h;
                let c_minus = evaluate_at(residual, coords, &perturbed, t)?;
                (c_plus - c_minus) / (2.0 * h)
            }
        };
        perturbed[j] = qj;
        cq.set_column(j, &column);
    }

    Ok(cq)
}

/// Evaluates the residual at the currently imposed state and checks its
/// length against the declared number of constraints.
pub(crate) fn evaluate_checked<S, R>(
    residual: &mut R,
    coords: &S,
    t: f64,
) -> NumdiffResult<DVector<f64>>
where
    S: LinkCoordinates + ?Sized,
    R: ConstraintResidual<S> + ?Sized,
{
    let c = residual.evaluate(coords, t)?;
    let expected = residual.num_constraints();
    if c.len() != expected {
        return Err(NumdiffError::DimensionMismatch {
            what: "Residual",
            expected,
            got: c.len(),
        });
    }
    Ok(c)
}

fn evaluate_at<S, R>(
    residual: &mut R,
    coords: &mut S,
    q: &DVector<f64>,
    t: f64,
) -> NumdiffResult<DVector<f64>>
where
    S: LinkCoordinates + ?Sized,
    R: ConstraintResidual<S> + ?Sized,
{
    coords.impose_coords(q, t)?;
    evaluate_checked(residual, &*coords, t)
}

/// Re-imposes `(q, t)` and then yields `outcome`. An evaluation error takes
/// precedence over a restore error.
pub(crate) fn restore<S, T>(
    coords: &mut S,
    q: &DVector<f64>,
    t: f64,
    outcome: NumdiffResult<T>,
) -> NumdiffResult<T>
where
    S: LinkCoordinates + ?Sized,
{
    let restored = coords.impose_coords(q, t);
    let value = outcome?;
    restored?;
    Ok(value)
}
