use nalgebra::SMatrix;
use num_complex::Complex;
use num_traits::Zero;

/// A value that quadrature can accumulate: it has a zero, can be added to
/// and scaled by a real weight. Scalars, complex numbers and fixed-size
/// matrices (hence vectors) all qualify.
///
/// Method names avoid the inherent `scale` and `zero` of nalgebra and
/// num-complex types, so calls on concrete values reach this trait.
pub trait Aggregate: Sized {
    /// The additive identity, the starting value of every sum.
    fn zero() -> Self;

    /// Adds `other` into `self` in place.
    fn accumulate(&mut self, other: &Self);

    /// Multiplies `self` in place by a real factor.
    fn scale_by(&mut self, factor: f64);
}

macro_rules! impl_aggregate_float {
    ($($t:ty),*) => {
        $(
            impl Aggregate for $t {
                fn zero() -> Self {
                    0.0
                }

                fn accumulate(&mut self, other: &Self) {
                    *self += *other;
                }

                fn scale_by(&mut self, factor: f64) {
                    *self *= factor as $t;
                }
            }
        )*
    };
}

impl_aggregate_float!(f32, f64);

impl Aggregate for Complex<f64> {
    fn zero() -> Self {
        Zero::zero()
    }

    fn accumulate(&mut self, other: &Self) {
        *self += *other;
    }

    fn scale_by(&mut self, factor: f64) {
        *self *= factor;
    }
}

impl Aggregate for Complex<f32> {
    fn zero() -> Self {
        Zero::zero()
    }

    fn accumulate(&mut self, other: &Self) {
        *self += *other;
    }

    fn scale_by(&mut self, factor: f64) {
        *self *= factor as f32;
    }
}

impl<const R: usize, const C: usize> Aggregate for SMatrix<f64, R, C> {
    fn zero() -> Self {
        Self::zeros()
    }

    fn accumulate(&mut self, other: &Self) {
        *self += other;
    }

    fn scale_by(&mut self, factor: f64) {
        *self *= factor;
    }
}

/// Integrand `T = f(x)` for [`Quadrature::integrate_1d`](crate::quadrature::Quadrature::integrate_1d).
pub trait Integrand1D<T: Aggregate> {
    fn evaluate(&mut self, x: f64) -> T;
}

/// Integrand `T = f(x, y)`.
pub trait Integrand2D<T: Aggregate> {
    fn evaluate(&mut self, x: f64, y: f64) -> T;
}

/// Integrand `T = f(x, y, z)`.
pub trait Integrand3D<T: Aggregate> {
    fn evaluate(&mut self, x: f64, y: f64, z: f64) -> T;
}

impl<T: Aggregate, F: FnMut(f64) -> T> Integrand1D<T> for F {
    fn evaluate(&mut self, x: f64) -> T {
        self(x)
    }
}

impl<T: Aggregate, F: FnMut(f64, f64) -> T> Integrand2D<T> for F {
    fn evaluate(&mut self, x: f64, y: f64) -> T {
        self(x, y)
    }
}

impl<T: Aggregate, F: FnMut(f64, f64, f64) -> T> Integrand3D<T> for F {
    fn evaluate(&mut self, x: f64, y: f64, z: f64) -> T {
        self(x, y, z)
    }
}
