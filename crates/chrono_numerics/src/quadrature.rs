//! Gauss-Legendre quadrature in 1D, 2D and 3D.
//!
//! Integrands are mapped from their axis-aligned domain onto `[-1, 1]^d`
//! and summed over the tensor product of the order-`n` Gauss points. The
//! result is exact, up to rounding, for integrands that are polynomials of
//! degree at most `2n - 1` along each axis.
//!
//! Orders `1..=STATIC_ORDER_MAX` use process-wide tables built once on first
//! use. Any higher order up to `MAX_ORDER` builds a private table for the
//! duration of the call and drops it afterwards; repeated high-order calls
//! pay that cost each time. Orders above `MAX_ORDER` are rejected.

mod tables;

pub use tables::{GaussLegendreRule, QuadratureTables, TableSettings, MAX_ORDER};

use std::borrow::Cow;
use std::sync::OnceLock;

use tracing::debug;

use crate::error::{QuadratureError, QuadratureResult};
use crate::traits::{Aggregate, Integrand1D, Integrand2D, Integrand3D};

/// Highest order served by the shared tables.
pub const STATIC_ORDER_MAX: usize = 10;

static STATIC_TABLES: OnceLock<QuadratureResult<QuadratureTables>> = OnceLock::new();

/// Affine map from `[a, b]` onto `[-1, 1]`: `x = c1 * r + c2`.
#[derive(Debug, Clone, Copy)]
struct AxisMap {
    c1: f64,
    c2: f64,
}

impl AxisMap {
    fn new(a: f64, b: f64) -> Self {
        Self {
            c1: (b - a) / 2.0,
            c2: (b + a) / 2.0,
        }
    }

    fn apply(&self, root: f64) -> f64 {
        self.c1 * root + self.c2
    }
}

/// Stateless Gauss-Legendre integration routines.
pub struct Quadrature;

impl Quadrature {
    /// Shared tables for orders `1..=STATIC_ORDER_MAX`, built on first access.
    pub fn static_tables() -> QuadratureResult<&'static QuadratureTables> {
        STATIC_TABLES
            .get_or_init(|| {
                debug!(order_to = STATIC_ORDER_MAX, "initializing shared quadrature tables");
                QuadratureTables::new(1, STATIC_ORDER_MAX)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Integrates `f(x)` over `[a, b]`.
    pub fn integrate_1d<T, F>(
        integrand: &mut F,
        a: f64,
        b: f64,
        order: usize,
    ) -> QuadratureResult<T>
    where
        T: Aggregate,
        F: Integrand1D<T> + ?Sized,
    {
        let tables = tables_for(order)?;
        let rule = rule_of(&tables, order)?;
        let x = AxisMap::new(a, b);

        let mut result = T::zero();
        for (r, w) in rule.roots.iter().zip(rule.weights) {
            let mut val = integrand.evaluate(x.apply(*r));
            val.scale_by(*w);
            result.accumulate(&val);
        }
        result.scale_by(x.c1);
        Ok(result)
    }

    /// Integrates `f(x, y)` over the rectangle `x_range × y_range`.
    pub fn integrate_2d<T, F>(
        integrand: &mut F,
        x_range: (f64, f64),
        y_range: (f64, f64),
        order: usize,
    ) -> QuadratureResult<T>
    where
        T: Aggregate,
        F: Integrand2D<T> + ?Sized,
    {
        let tables = tables_for(order)?;
        let rule = rule_of(&tables, order)?;
        let x = AxisMap::new(x_range.0, x_range.1);
        let y = AxisMap::new(y_range.0, y_range.1);

        let mut result = T::zero();
        for (rx, wx) in rule.roots.iter().zip(rule.weights) {
            for (ry, wy) in rule.roots.iter().zip(rule.weights) {
                let mut val = integrand.evaluate(x.apply(*rx), y.apply(*ry));
                val.scale_by(wx * wy);
                result.accumulate(&val);
            }
        }
        result.scale_by(x.c1 * y.c1);
        Ok(result)
    }

    /// Integrates `f(x, y, z)` over the box `x_range × y_range × z_range`.
    pub fn integrate_3d<T, F>(
        integrand: &mut F,
        x_range: (f64, f64),
        y_range: (f64, f64),
        z_range: (f64, f64),
        order: usize,
    ) -> QuadratureResult<T>
    where
        T: Aggregate,
        F: Integrand3D<T> + ?Sized,
    {
        let tables = tables_for(order)?;
        let rule = rule_of(&tables, order)?;
        let x = AxisMap::new(x_range.0, x_range.1);
        let y = AxisMap::new(y_range.0, y_range.1);
        let z = AxisMap::new(z_range.0, z_range.1);

        let mut result = T::zero();
        for (rx, wx) in rule.roots.iter().zip(rule.weights) {
            for (ry, wy) in rule.roots.iter().zip(rule.weights) {
                for (rz, wz) in rule.roots.iter().zip(rule.weights) {
                    let mut val = integrand.evaluate(x.apply(*rx), y.apply(*ry), z.apply(*rz));
                    val.scale_by(wx * wy * wz);
                    result.accumulate(&val);
                }
            }
        }
        result.scale_by(x.c1 * y.c1 * z.c1);
        Ok(result)
    }
}

/// Borrows the shared tables when they cover `order`, otherwise builds a
/// single-order table owned by the caller.
fn tables_for(order: usize) -> QuadratureResult<Cow<'static, QuadratureTables>> {
    if order == 0 || order > MAX_ORDER {
        return Err(QuadratureError::InvalidOrder { order });
    }
    let shared = Quadrature::static_tables()?;
    if shared.contains(order) {
        return Ok(Cow::Borrowed(shared));
    }
    debug!(order, "order outside shared tables, building on-demand table");
    Ok(Cow::Owned(QuadratureTables::new(order, order)?))
}

fn rule_of(tables: &QuadratureTables, order: usize) -> QuadratureResult<GaussLegendreRule<'_>> {
    tables
        .rule(order)
        .ok_or(QuadratureError::InvalidOrder { order })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix2, Vector2};

    /// Polynomial with coefficients `coeffs[k]` for `x^k`.
    fn poly(coeffs: &[f64], x: f64) -> f64 {
        coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }

    fn poly_integral(coeffs: &[f64], a: f64, b: f64) -> f64 {
        coeffs
            .iter()
            .enumerate()
            .map(|(k, c)| {
                let p = (k + 1) as i32;
                c * (b.powi(p) - a.powi(p)) / p as f64
            })
            .sum()
    }

    #[test]
    fn integrate_1d_is_exact_for_degree_2n_minus_1() {
        let (a, b) = (-0.7, 1.3);
        for n in 1..=STATIC_ORDER_MAX {
            let coeffs: Vec<f64> = (0..2 * n)
                .map(|k| if k % 2 == 0 { (k + 1) as f64 } else { -0.5 * k as f64 })
                .collect();
            let mut f = |x: f64| poly(&coeffs, x);
            let value: f64 = Quadrature::integrate_1d(&mut f, a, b, n).expect("integral");
            let exact = poly_integral(&coeffs, a, b);
            let rel = (value - exact).abs() / exact.abs().max(1.0);
            assert!(rel < 1e-10, "order {n}: got {value}, expected {exact}");
        }
    }

    #[test]
    fn integrate_1d_is_not_exact_beyond_degree_2n_minus_1() {
        // x^2 with one point: the midpoint rule misses it.
        let mut f = |x: f64| x * x;
        let value: f64 = Quadrature::integrate_1d(&mut f, -1.0, 1.0, 1).unwrap();
        assert_eq!(value, 0.0);
        let value: f64 = Quadrature::integrate_1d(&mut f, -1.0, 1.0, 2).unwrap();
        assert_relative_eq!(value, 2.0 / 3.0, epsilon = 1e-15);
    }

    #[test]
    fn reversed_bounds_negate_the_result() {
        let mut f = |x: f64| x.exp();
        let forward: f64 = Quadrature::integrate_1d(&mut f, 0.2, 2.0, 6).unwrap();
        let backward: f64 = Quadrature::integrate_1d(&mut f, 2.0, 0.2, 6).unwrap();
        assert_relative_eq!(forward, -backward, max_relative = 1e-14);
    }

    #[test]
    fn separable_2d_and_3d_equal_products_of_1d_integrals() {
        let g = |x: f64| 1.0 + x + 3.0 * x * x;
        let h = |y: f64| 2.0 - y * y * y;
        let k = |z: f64| z.cos();

        let gx: f64 = Quadrature::integrate_1d(&mut |x| g(x), 0.0, 2.0, 4).unwrap();
        let hy: f64 = Quadrature::integrate_1d(&mut |y| h(y), -1.0, 0.5, 4).unwrap();
        let kz: f64 = Quadrature::integrate_1d(&mut |z| k(z), 0.0, 1.0, 4).unwrap();

        let two_d: f64 =
            Quadrature::integrate_2d(&mut |x, y| g(x) * h(y), (0.0, 2.0), (-1.0, 0.5), 4).unwrap();
        assert_relative_eq!(two_d, gx * hy, max_relative = 1e-12);

        let three_d: f64 = Quadrature::integrate_3d(
            &mut |x, y, z| g(x) * h(y) * k(z),
            (0.0, 2.0),
            (-1.0, 0.5),
            (0.0, 1.0),
            4,
        )
        .unwrap();
        assert_relative_eq!(three_d, gx * hy * kz, max_relative = 1e-12);
    }

    #[test]
    fn volume_of_box_is_exact() {
        let volume: f64 = Quadrature::integrate_3d(
            &mut |_: f64, _: f64, _: f64| 1.0,
            (0.0, 2.0),
            (1.0, 4.0),
            (-1.0, 0.5),
            1,
        )
        .unwrap();
        assert_relative_eq!(volume, 2.0 * 3.0 * 1.5, epsilon = 1e-14);
    }

    #[test]
    fn evaluates_order_pow_dimension_points() {
        let mut calls = 0usize;
        let _: f64 = Quadrature::integrate_3d(
            &mut |x: f64, y: f64, z: f64| {
                calls += 1;
                x + y + z
            },
            (0.0, 1.0),
            (0.0, 1.0),
            (0.0, 1.0),
            3,
        )
        .unwrap();
        assert_eq!(calls, 27);
    }

    #[test]
    fn order_beyond_shared_tables_falls_back_to_on_demand_table() {
        let exact = 1.0 - (-3.0_f64).exp();
        let mut f = |x: f64| (-x).exp();
        let in_range: f64 =
            Quadrature::integrate_1d(&mut f, 0.0, 3.0, STATIC_ORDER_MAX).unwrap();
        let beyond: f64 = Quadrature::integrate_1d(&mut f, 0.0, 3.0, 16).unwrap();
        let far_beyond: f64 = Quadrature::integrate_1d(&mut f, 0.0, 3.0, 48).unwrap();

        assert!((in_range - exact).abs() < 1e-9);
        assert!((beyond - exact).abs() <= (in_range - exact).abs() + 1e-15);
        assert_relative_eq!(far_beyond, exact, max_relative = 1e-13);

        // High-order polynomial exactness on the on-demand path as well.
        let coeffs: Vec<f64> = (0..31).map(|k| 1.0 / (k + 1) as f64).collect();
        let value: f64 =
            Quadrature::integrate_1d(&mut |x| poly(&coeffs, x), -1.0, 1.0, 16).unwrap();
        assert_relative_eq!(value, poly_integral(&coeffs, -1.0, 1.0), max_relative = 1e-12);
    }

    #[test]
    fn order_zero_is_rejected_before_evaluation() {
        let mut calls = 0usize;
        let result: QuadratureResult<f64> = Quadrature::integrate_1d(
            &mut |x: f64| {
                calls += 1;
                x
            },
            0.0,
            1.0,
            0,
        );
        assert_eq!(result, Err(QuadratureError::InvalidOrder { order: 0 }));
        assert_eq!(calls, 0);

        let result: QuadratureResult<f64> =
            Quadrature::integrate_2d(&mut |x: f64, y: f64| x * y, (0.0, 1.0), (0.0, 1.0), 0);
        assert!(result.is_err());
    }

    #[test]
    fn orders_above_ceiling_are_rejected_before_evaluation() {
        let mut calls = 0usize;
        for order in [MAX_ORDER + 1, usize::MAX] {
            let result: QuadratureResult<f64> = Quadrature::integrate_1d(
                &mut |x: f64| {
                    calls += 1;
                    x
                },
                0.0,
                1.0,
                order,
            );
            assert_eq!(result, Err(QuadratureError::InvalidOrder { order }));
        }
        let result: QuadratureResult<f64> = Quadrature::integrate_3d(
            &mut |x: f64, y: f64, z: f64| x * y * z,
            (0.0, 1.0),
            (0.0, 1.0),
            (0.0, 1.0),
            usize::MAX,
        );
        assert!(result.is_err());
        assert_eq!(calls, 0);
    }

    #[test]
    fn static_tables_are_shared() {
        let a = Quadrature::static_tables().unwrap();
        let b = Quadrature::static_tables().unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.order_from(), 1);
        assert_eq!(a.order_to(), STATIC_ORDER_MAX);
    }

    #[test]
    fn static_tables_are_shared_across_threads() {
        let addresses: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let tables = Quadrature::static_tables().unwrap();
                        tables as *const QuadratureTables as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let main = Quadrature::static_tables().unwrap() as *const QuadratureTables as usize;
        assert!(addresses.iter().all(|a| *a == main));
    }

    #[test]
    fn integrates_vector_and_matrix_valued_functions() {
        let v: Vector2<f64> =
            Quadrature::integrate_1d(&mut |x: f64| Vector2::new(x, x * x), 0.0, 1.0, 2).unwrap();
        assert_relative_eq!(v, Vector2::new(0.5, 1.0 / 3.0), epsilon = 1e-15);

        let m: Matrix2<f64> = Quadrature::integrate_2d(
            &mut |x: f64, y: f64| Matrix2::new(1.0, x, y, x * y),
            (0.0, 2.0),
            (0.0, 1.0),
            2,
        )
        .unwrap();
        assert_relative_eq!(m, Matrix2::new(2.0, 2.0, 1.0, 1.0), epsilon = 1e-14);
    }

    #[test]
    fn stateful_integrand_struct() {
        struct Counting {
            calls: usize,
        }

        impl Integrand1D<f64> for Counting {
            fn evaluate(&mut self, x: f64) -> f64 {
                self.calls += 1;
                x.sin()
            }
        }

        let mut integrand = Counting { calls: 0 };
        let value: f64 =
            Quadrature::integrate_1d(&mut integrand, 0.0, std::f64::consts::PI, 10).unwrap();
        assert_relative_eq!(value, 2.0, epsilon = 1e-12);
        assert_eq!(integrand.calls, 10);
    }
}
