//! Constraint links whose Jacobians are obtained by numerical differentiation.
//!
//! A user only supplies the residual `C(q, t)` of the constraint through
//! [`ConstraintResidual`]. [`NumdiffLink`] then derives `Ct = dC/dt` and the
//! Jacobians `Cq1`, `Cq2` with respect to the coordinates of the two
//! connected bodies by fixed-step finite differences.
//!
//! Differentiating this way is slower and less precise than an analytic
//! Jacobian. Residuals that know a closed form can override
//! [`ConstraintResidual::time_derivative`] or [`ConstraintResidual::jacobian`].
//!
//! The link perturbs the bodies in place while differencing, so it must not
//! run concurrently against the same bodies. Every public operation leaves
//! the bodies in the nominal configuration when it returns.

pub mod body;
pub mod difference;

pub use body::{Body, BodyPair, LinkCoordinates, RigidBody, DEFAULT_NUM_COORDS};

use anyhow::Result;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::{NumdiffError, NumdiffResult};
use difference::{evaluate_checked, restore};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DifferenceScheme {
    /// `(f(x + h) - f(x)) / h`
    Forward,
    /// `(f(x + h) - f(x - h)) / 2h`
    Central,
}

/// Settings of the finite-difference estimates. The step is fixed, it is
/// not adapted to the magnitude of the residual.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NumdiffSettings {
    pub step: f64,
    pub scheme: DifferenceScheme,
}

impl Default for NumdiffSettings {
    fn default() -> Self {
        Self {
            step: 1e-7,
            scheme: DifferenceScheme::Forward,
        }
    }
}

impl NumdiffSettings {
    pub fn validate(&self) -> NumdiffResult<()> {
        if !(self.step > 0.0) || !self.step.is_finite() {
            return Err(NumdiffError::InvalidSettings(format!(
                "step must be positive and finite, got {}",
                self.step
            )));
        }
        Ok(())
    }
}

/// The residual `C(q, t)` of a constraint over the coordinates `S`.
///
/// Only [`num_constraints`](Self::num_constraints) is mandatory. A residual
/// that does not override [`evaluate`](Self::evaluate) imposes no
/// constraint: `C`, `Ct` and `Cq` all come out as zero.
pub trait ConstraintResidual<S: LinkCoordinates + ?Sized> {
    fn num_constraints(&self) -> usize;

    /// Evaluates `C` at the state currently imposed on `coords`, at time `t`.
    fn evaluate(&mut self, _coords: &S, _t: f64) -> Result<DVector<f64>> {
        Ok(DVector::zeros(self.num_constraints()))
    }

    /// `Ct` at `(q, t)`, given `c = C(q, t)`.
    fn time_derivative(
        &mut self,
        coords: &mut S,
        q: &DVector<f64>,
        t: f64,
        c: &DVector<f64>,
        settings: &NumdiffSettings,
    ) -> NumdiffResult<DVector<f64>> {
        difference::time_derivative(self, coords, q, t, c, settings)
    }

    /// Full `dC/dq` at `(q, t)` with one column per coordinate, given
    /// `c = C(q, t)`.
    fn jacobian(
        &mut self,
        coords: &mut S,
        q: &DVector<f64>,
        t: f64,
        c: &DVector<f64>,
        settings: &NumdiffSettings,
    ) -> NumdiffResult<DMatrix<f64>> {
        difference::jacobian(self, coords, q, t, c, settings)
    }
}

/// A link that constrains nothing.
#[derive(Debug, Clone, Copy)]
pub struct Unconstrained {
    pub num_constraints: usize,
}

impl<S: LinkCoordinates + ?Sized> ConstraintResidual<S> for Unconstrained {
    fn num_constraints(&self) -> usize {
        self.num_constraints
    }
}

/// Adapts a closure `C(q, t)` over the fetched coordinate vector.
pub struct ResidualFn<F> {
    num_constraints: usize,
    f: F,
}

impl<F> ResidualFn<F>
where
    F: FnMut(&DVector<f64>, f64) -> Result<DVector<f64>>,
{
    pub fn new(num_constraints: usize, f: F) -> Self {
        Self { num_constraints, f }
    }
}

impl<S, F> ConstraintResidual<S> for ResidualFn<F>
where
    S: LinkCoordinates + ?Sized,
    F: FnMut(&DVector<f64>, f64) -> Result<DVector<f64>>,
{
    fn num_constraints(&self) -> usize {
        self.num_constraints
    }

    fn evaluate(&mut self, coords: &S, t: f64) -> Result<DVector<f64>> {
        (self.f)(&coords.fetch_coords(), t)
    }
}

/// Serializable snapshot of the terms a link hands to the solver.
/// Jacobians are stored row-major with `c.len()` rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintTerms {
    pub time: Option<f64>,
    pub c: Vec<f64>,
    pub ct: Vec<f64>,
    pub cq1: Vec<f64>,
    pub cq1_cols: usize,
    pub cq2: Vec<f64>,
    pub cq2_cols: usize,
}

/// Constraint link with numerically differentiated `Ct`, `Cq1` and `Cq2`.
#[derive(Debug, Clone)]
pub struct NumdiffLink<R> {
    residual: R,
    settings: NumdiffSettings,
    time: Option<f64>,
    c: DVector<f64>,
    ct: DVector<f64>,
    cq1: DMatrix<f64>,
    cq2: DMatrix<f64>,
}

impl<R> NumdiffLink<R> {
    pub fn new(residual: R) -> Self {
        Self {
            residual,
            settings: NumdiffSettings::default(),
            time: None,
            c: DVector::zeros(0),
            ct: DVector::zeros(0),
            cq1: DMatrix::zeros(0, 0),
            cq2: DMatrix::zeros(0, 0),
        }
    }

    pub fn with_settings(residual: R, settings: NumdiffSettings) -> NumdiffResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            ..Self::new(residual)
        })
    }

    pub fn settings(&self) -> &NumdiffSettings {
        &self.settings
    }

    pub fn residual(&self) -> &R {
        &self.residual
    }

    pub fn residual_mut(&mut self) -> &mut R {
        &mut self.residual
    }

    /// Time of the last imposed state, if any.
    pub fn time(&self) -> Option<f64> {
        self.time
    }

    pub fn c(&self) -> &DVector<f64> {
        &self.c
    }

    pub fn ct(&self) -> &DVector<f64> {
        &self.ct
    }

    pub fn cq1(&self) -> &DMatrix<f64> {
        &self.cq1
    }

    pub fn cq2(&self) -> &DMatrix<f64> {
        &self.cq2
    }

    pub fn terms(&self) -> ConstraintTerms {
        ConstraintTerms {
            time: self.time,
            c: self.c.iter().copied().collect(),
            ct: self.ct.iter().copied().collect(),
            cq1: row_major(&self.cq1),
            cq1_cols: self.cq1.ncols(),
            cq2: row_major(&self.cq2),
            cq2_cols: self.cq2.ncols(),
        }
    }

    /// Forces the bodies into the coordinates `q` at time `t`.
    pub fn impose_state<S>(
        &mut self,
        coords: &mut S,
        q: &DVector<f64>,
        t: f64,
    ) -> NumdiffResult<()>
    where
        S: LinkCoordinates + ?Sized,
    {
        check_coords(&*coords, q)?;
        coords.impose_coords(q, t)?;
        self.time = Some(t);
        Ok(())
    }

    pub fn read_state<S>(&self, coords: &S) -> DVector<f64>
    where
        S: LinkCoordinates + ?Sized,
    {
        coords.fetch_coords()
    }

    pub fn read_state_dt<S>(&self, coords: &S) -> DVector<f64>
    where
        S: LinkCoordinates + ?Sized,
    {
        coords.fetch_coords_dt()
    }

    /// Evaluates `C` at the imposed state.
    pub fn compute_residual<S>(&mut self, coords: &S) -> NumdiffResult<DVector<f64>>
    where
        S: LinkCoordinates + ?Sized,
        R: ConstraintResidual<S>,
    {
        let t = self.time.ok_or(NumdiffError::StateNotImposed)?;
        evaluate_checked(&mut self.residual, coords, t)
    }

    /// Estimates `Ct` at the imposed state.
    pub fn compute_time_derivative<S>(&mut self, coords: &mut S) -> NumdiffResult<DVector<f64>>
    where
        S: LinkCoordinates + ?Sized,
        R: ConstraintResidual<S>,
    {
        let q = coords.fetch_coords();
        let c = self.compute_residual(&*coords)?;
        self.time_derivative_at(coords, &q, &c)
    }

    /// Estimates `(Cq1, Cq2)` at the imposed state.
    pub fn compute_jacobian<S>(
        &mut self,
        coords: &mut S,
    ) -> NumdiffResult<(DMatrix<f64>, DMatrix<f64>)>
    where
        S: LinkCoordinates + ?Sized,
        R: ConstraintResidual<S>,
    {
        let q = coords.fetch_coords();
        let c = self.compute_residual(&*coords)?;
        self.jacobian_at(coords, &q, &c)
    }

    /// Refreshes `C`, `Ct`, `Cq1` and `Cq2` for the bodies' current state at
    /// time `t`.
    ///
    /// On return the bodies hold exactly the state they had on entry, also
    /// when the residual fails; the failure is then propagated and the
    /// previously stored terms are kept.
    pub fn update_state<S>(&mut self, coords: &mut S, t: f64) -> NumdiffResult<()>
    where
        S: LinkCoordinates + ?Sized,
        R: ConstraintResidual<S>,
    {
        let nominal = coords.fetch_coords();
        let outcome = self.refresh_terms(coords, &nominal, t);
        if let Err(err) = &outcome {
            warn!(error = %err, "constraint refresh failed, restoring nominal state");
        }
        let restored = self.impose_state(coords, &nominal, t);
        outcome?;
        restored
    }

    fn refresh_terms<S>(&mut self, coords: &mut S, q: &DVector<f64>, t: f64) -> NumdiffResult<()>
    where
        S: LinkCoordinates + ?Sized,
        R: ConstraintResidual<S>,
    {
        self.impose_state(coords, q, t)?;
        let c = self.compute_residual(&*coords)?;
        let ct = self.time_derivative_at(coords, q, &c)?;
        let (cq1, cq2) = self.jacobian_at(coords, q, &c)?;
        trace!(
            t,
            constraints = c.len(),
            residual_norm = c.norm(),
            "refreshed numerically differentiated link"
        );

        self.c = c;
        self.ct = ct;
        self.cq1 = cq1;
        self.cq2 = cq2;
        Ok(())
    }

    fn time_derivative_at<S>(
        &mut self,
        coords: &mut S,
        q: &DVector<f64>,
        c: &DVector<f64>,
    ) -> NumdiffResult<DVector<f64>>
    where
        S: LinkCoordinates + ?Sized,
        R: ConstraintResidual<S>,
    {
        let t = self.time.ok_or(NumdiffError::StateNotImposed)?;
        let settings = self.settings;
        let outcome = self
            .residual
            .time_derivative(coords, q, t, c, &settings)
            .and_then(|ct| {
                check_len("Time derivative", c.len(), ct.len())?;
                Ok(ct)
            });
        restore(coords, q, t, outcome)
    }

    fn jacobian_at<S>(
        &mut self,
        coords: &mut S,
        q: &DVector<f64>,
        c: &DVector<f64>,
    ) -> NumdiffResult<(DMatrix<f64>, DMatrix<f64>)>
    where
        S: LinkCoordinates + ?Sized,
        R: ConstraintResidual<S>,
    {
        let t = self.time.ok_or(NumdiffError::StateNotImposed)?;
        let settings = self.settings;
        let outcome = self
            .residual
            .jacobian(coords, q, t, c, &settings)
            .and_then(|cq| {
                check_len("Jacobian rows", c.len(), cq.nrows())?;
                check_len("Jacobian columns", q.len(), cq.ncols())?;
                Ok(cq)
            });
        let cq = restore(coords, q, t, outcome)?;

        let split = coords.split().min(cq.ncols());
        let cq1 = cq.columns(0, split).into_owned();
        let cq2 = cq.columns(split, cq.ncols() - split).into_owned();
        Ok((cq1, cq2))
    }
}

fn check_coords<S>(coords: &S, q: &DVector<f64>) -> NumdiffResult<()>
where
    S: LinkCoordinates + ?Sized,
{
    check_len("Coordinate vector", coords.num_coords(), q.len())
}

fn check_len(what: &'static str, expected: usize, got: usize) -> NumdiffResult<()> {
    if expected != got {
        return Err(NumdiffError::DimensionMismatch {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

fn row_major(m: &DMatrix<f64>) -> Vec<f64> {
    m.transpose().iter().copied().collect()
}
