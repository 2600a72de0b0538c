use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Numeric type a model can be evaluated in. Rates are stored as `f64` and
/// converted on entry, so `f32` runs share the same parameter records.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Converts an `f64` constant (a rate, a Butcher coefficient) into the scalar type.
pub(crate) fn constant<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// A system of first-order ODEs `dx/dt = f(t, x)`.
pub trait DynamicalSystem<T: Scalar> {
    /// Number of compartments.
    fn dimension(&self) -> usize;

    /// Writes the rates of change at `(t, x)` into `out`, which has the
    /// same length as `x`.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// One fixed step of an explicit integrator, advancing `t` and `state` in place.
pub trait Steppable<T: Scalar> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}
