//! Gauss-Legendre root and weight tables.
//!
//! For every order `n` the table holds the `n` roots of the Legendre
//! polynomial `P_n` on `[-1, 1]`, in ascending order, and the matching
//! integration weights. Tables are computed once and never mutated.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QuadratureError, QuadratureResult};

/// Highest order a table may hold. Higher orders are rejected before any
/// allocation; building a table costs `O(n^2)` Legendre evaluations.
pub const MAX_ORDER: usize = 1024;

/// Settings controlling the Newton polishing of Legendre roots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TableSettings {
    /// Newton steps allowed per root before construction fails.
    pub max_newton_steps: usize,
    /// Convergence threshold on the size of a Newton step.
    pub tolerance: f64,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            max_newton_steps: 100,
            tolerance: 1e-14,
        }
    }
}

impl TableSettings {
    fn validate(&self) -> QuadratureResult<()> {
        if self.max_newton_steps == 0 {
            return Err(QuadratureError::InvalidSettings(
                "max_newton_steps must be greater than zero".into(),
            ));
        }
        if !(self.tolerance > 0.0) || !self.tolerance.is_finite() {
            return Err(QuadratureError::InvalidSettings(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Borrowed view of the roots and weights for a single order.
#[derive(Debug, Clone, Copy)]
pub struct GaussLegendreRule<'a> {
    pub roots: &'a [f64],
    pub weights: &'a [f64],
}

impl GaussLegendreRule<'_> {
    /// Number of points of the rule.
    pub fn order(&self) -> usize {
        self.roots.len()
    }
}

/// Gauss-Legendre tables for the orders `order_from..=order_to`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureTables {
    order_from: usize,
    roots: Vec<Vec<f64>>,
    weights: Vec<Vec<f64>>,
}

impl QuadratureTables {
    /// Builds tables for `order_from..=order_to` with default settings.
    pub fn new(order_from: usize, order_to: usize) -> QuadratureResult<Self> {
        Self::with_settings(order_from, order_to, TableSettings::default())
    }

    /// Builds tables for every order in `order_from..=order_to`.
    ///
    /// Orders above [`MAX_ORDER`] are rejected with
    /// [`QuadratureError::InvalidOrder`]. Construction is all-or-nothing: if
    /// any root fails to converge the error is returned and no table is
    /// produced.
    pub fn with_settings(
        order_from: usize,
        order_to: usize,
        settings: TableSettings,
    ) -> QuadratureResult<Self> {
        if order_from == 0 {
            return Err(QuadratureError::InvalidOrder { order: order_from });
        }
        if order_to < order_from {
            return Err(QuadratureError::InvalidRange {
                from: order_from,
                to: order_to,
            });
        }
        if order_to > MAX_ORDER {
            return Err(QuadratureError::InvalidOrder { order: order_to });
        }
        settings.validate()?;

        let count = order_to - order_from + 1;
        let mut roots = Vec::with_capacity(count);
        let mut weights = Vec::with_capacity(count);
        for n in order_from..=order_to {
            let (r, w) = legendre_roots_and_weights(n, &settings)?;
            roots.push(r);
            weights.push(w);
        }

        debug!(order_from, order_to, "built Gauss-Legendre tables");
        Ok(Self {
            order_from,
            roots,
            weights,
        })
    }

    /// Lowest order held.
    pub fn order_from(&self) -> usize {
        self.order_from
    }

    /// Highest order held.
    pub fn order_to(&self) -> usize {
        self.order_from + self.roots.len() - 1
    }

    /// Whether `order` lies in `order_from..=order_to`.
    pub fn contains(&self, order: usize) -> bool {
        order >= self.order_from && order <= self.order_to()
    }

    /// Roots of `P_order` in ascending order, if the order is held.
    pub fn roots(&self, order: usize) -> Option<&[f64]> {
        self.index(order).map(|i| self.roots[i].as_slice())
    }

    /// Weights matching [`roots`](Self::roots).
    pub fn weights(&self, order: usize) -> Option<&[f64]> {
        self.index(order).map(|i| self.weights[i].as_slice())
    }

    /// Roots and weights of one order together.
    pub fn rule(&self, order: usize) -> Option<GaussLegendreRule<'_>> {
        self.index(order).map(|i| GaussLegendreRule {
            roots: &self.roots[i],
            weights: &self.weights[i],
        })
    }

    /// Dumps every table to stdout, for debugging.
    pub fn print_tables(&self) {
        print!("{self}");
    }

    fn index(&self, order: usize) -> Option<usize> {
        if self.contains(order) {
            Some(order - self.order_from)
        } else {
            None
        }
    }
}

impl fmt::Display for QuadratureTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (offset, (roots, weights)) in self.roots.iter().zip(&self.weights).enumerate() {
            writeln!(f, "Order: {}", self.order_from + offset)?;
            for (root, weight) in roots.iter().zip(weights) {
                writeln!(f, "  root {root:>24.17e}   weight {weight:>24.17e}")?;
            }
        }
        Ok(())
    }
}

/// Computes the roots of `P_n` and the matching weights.
///
/// Only the positive half is polished; the negative half is its mirror
/// image, so the table is exactly symmetric. The middle root of an odd
/// order is exactly zero.
fn legendre_roots_and_weights(
    n: usize,
    settings: &TableSettings,
) -> QuadratureResult<(Vec<f64>, Vec<f64>)> {
    let mut roots = vec![0.0; n];
    let mut weights = vec![0.0; n];

    for i in 0..n / 2 {
        let x = polish_root(n, i, settings)?;
        let (_, dp) = legendre_eval(n, x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        roots[i] = -x;
        roots[n - 1 - i] = x;
        weights[i] = w;
        weights[n - 1 - i] = w;
    }

    if n % 2 == 1 {
        let mid = n / 2;
        let (_, dp) = legendre_eval(n, 0.0);
        roots[mid] = 0.0;
        weights[mid] = 2.0 / (dp * dp);
    }

    Ok((roots, weights))
}

/// Newton iteration for the `i`-th largest root of `P_n`.
fn polish_root(n: usize, i: usize, settings: &TableSettings) -> QuadratureResult<f64> {
    let mut x = f64::cos(PI * (i as f64 + 0.75) / (n as f64 + 0.5));
    for _ in 0..settings.max_newton_steps {
        let (p, dp) = legendre_eval(n, x);
        let dx = -p / dp;
        if !dx.is_finite() {
            break;
        }
        x += dx;
        if dx.abs() <= settings.tolerance {
            return Ok(x);
        }
    }
    Err(QuadratureError::RootNotConverged {
        order: n,
        index: i,
        iterations: settings.max_newton_steps,
    })
}

/// Evaluates `P_n(x)` and `P_n'(x)` with the three-term recurrence.
fn legendre_eval(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let mut p0 = 1.0;
    let mut p1 = x;
    for k in 2..=n {
        let kf = k as f64;
        let pn = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = pn;
    }
    // P_n'(x) = n (x P_n - P_{n-1}) / (x^2 - 1), valid strictly inside (-1, 1)
    let dp = (n as f64) * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_err_contains<T: std::fmt::Debug>(result: QuadratureResult<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn low_orders_match_closed_form() {
        let tables = QuadratureTables::new(1, 3).expect("tables should build");

        assert_eq!(tables.roots(1).unwrap(), &[0.0]);
        assert_relative_eq!(tables.weights(1).unwrap()[0], 2.0, epsilon = 1e-15);

        let r2 = tables.roots(2).unwrap();
        let s = 1.0 / 3.0_f64.sqrt();
        assert_relative_eq!(r2[0], -s, epsilon = 1e-15);
        assert_relative_eq!(r2[1], s, epsilon = 1e-15);
        for w in tables.weights(2).unwrap() {
            assert_relative_eq!(*w, 1.0, epsilon = 1e-14);
        }

        let r3 = tables.roots(3).unwrap();
        let w3 = tables.weights(3).unwrap();
        let s = (3.0_f64 / 5.0).sqrt();
        assert_relative_eq!(r3[0], -s, epsilon = 1e-15);
        assert_eq!(r3[1], 0.0);
        assert_relative_eq!(r3[2], s, epsilon = 1e-15);
        assert_relative_eq!(w3[0], 5.0 / 9.0, epsilon = 1e-14);
        assert_relative_eq!(w3[1], 8.0 / 9.0, epsilon = 1e-14);
        assert_relative_eq!(w3[2], 5.0 / 9.0, epsilon = 1e-14);
    }

    #[test]
    fn tables_are_symmetric_sorted_and_normalized() {
        let tables = QuadratureTables::new(1, 24).expect("tables should build");
        for n in 1..=24 {
            let roots = tables.roots(n).unwrap();
            let weights = tables.weights(n).unwrap();
            assert_eq!(roots.len(), n);
            assert_eq!(weights.len(), n);

            for pair in roots.windows(2) {
                assert!(pair[0] < pair[1], "order {n} roots not ascending");
            }
            for (i, r) in roots.iter().enumerate() {
                assert!(*r > -1.0 && *r < 1.0);
                assert_eq!(*r, -roots[n - 1 - i]);
            }
            assert!(weights.iter().all(|w| *w > 0.0));
            let sum: f64 = weights.iter().sum();
            assert_relative_eq!(sum, 2.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn roots_are_zeros_of_the_legendre_polynomial() {
        let tables = QuadratureTables::new(5, 12).expect("tables should build");
        for n in 5..=12 {
            for &x in tables.roots(n).unwrap() {
                let (p, _) = legendre_eval(n, x);
                assert!(p.abs() < 1e-13, "P_{n}({x}) = {p}");
            }
        }
    }

    #[test]
    fn construction_is_deterministic() {
        let a = QuadratureTables::new(1, 10).unwrap();
        let b = QuadratureTables::new(1, 10).unwrap();
        assert_eq!(a, b);

        // A single-order table agrees with the same order inside a range.
        let single = QuadratureTables::new(7, 7).unwrap();
        assert_eq!(single.roots(7), a.roots(7));
        assert_eq!(single.weights(7), a.weights(7));
    }

    #[test]
    fn rejects_invalid_ranges() {
        assert_err_contains(QuadratureTables::new(0, 4), "order 0");
        assert_err_contains(QuadratureTables::new(5, 4), "5..=4");
    }

    #[test]
    fn rejects_orders_above_ceiling() {
        assert_eq!(
            QuadratureTables::new(MAX_ORDER, MAX_ORDER + 1),
            Err(QuadratureError::InvalidOrder {
                order: MAX_ORDER + 1
            })
        );
        assert_eq!(
            QuadratureTables::new(1, usize::MAX),
            Err(QuadratureError::InvalidOrder { order: usize::MAX })
        );
        assert_err_contains(QuadratureTables::new(2000, 2000), "must be in 1..=1024");
    }

    #[test]
    fn rejects_invalid_settings() {
        let settings = TableSettings {
            max_newton_steps: 0,
            ..TableSettings::default()
        };
        assert_err_contains(
            QuadratureTables::with_settings(1, 3, settings),
            "max_newton_steps",
        );

        let settings = TableSettings {
            tolerance: -1.0,
            ..TableSettings::default()
        };
        assert_err_contains(QuadratureTables::with_settings(1, 3, settings), "tolerance");
    }

    #[test]
    fn non_convergence_aborts_construction() {
        let settings = TableSettings {
            max_newton_steps: 1,
            tolerance: 1e-300,
        };
        let err = QuadratureTables::with_settings(2, 6, settings).expect_err("should fail");
        assert!(matches!(
            err,
            QuadratureError::RootNotConverged { order: 2, index: 0, iterations: 1 }
        ));
    }

    #[test]
    fn lookup_outside_range_returns_none() {
        let tables = QuadratureTables::new(3, 5).unwrap();
        assert_eq!(tables.order_from(), 3);
        assert_eq!(tables.order_to(), 5);
        assert!(tables.rule(2).is_none());
        assert!(tables.rule(6).is_none());
        assert_eq!(tables.rule(4).map(|r| r.order()), Some(4));
    }

    #[test]
    fn display_lists_every_order() {
        let tables = QuadratureTables::new(1, 2).unwrap();
        let dump = format!("{tables}");
        assert!(dump.contains("Order: 1"));
        assert!(dump.contains("Order: 2"));
        assert_eq!(dump.lines().count(), 2 + 1 + 2);
    }
}
