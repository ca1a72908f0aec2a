use anyhow::Result;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in a traced integration.
/// `f64` evaluates eagerly; `Dual<T>` carries a tangent alongside every value.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Lifts an `f64` literal into any scalar type.
/// Every `Float` type can represent an `f64`, so the NaN fallback is never hit
/// for the types this crate works with; a NaN would surface as a non-finite state.
pub fn lit<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// Value part of a scalar as `f64` (the tangent parts of a `Dual` are dropped).
pub fn value_of<T: Scalar>(x: T) -> f64 {
    x.to_f64().unwrap_or(f64::NAN)
}

/// Right-hand side of a first-order system dy/dt = f(t, y, params).
///
/// Implementations must be pure: steppers call `apply` several times per step
/// with trial states, and identical inputs must give identical outputs.
pub trait OdeSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// y: current state
    /// params: extra parameters forwarded unchanged from the caller
    /// out: buffer to write dy/dt
    fn apply(&self, t: T, y: &[T], params: &[T], out: &mut [T]) -> Result<()>;
}

impl<T: Scalar, S: OdeSystem<T> + ?Sized> OdeSystem<T> for &S {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn apply(&self, t: T, y: &[T], params: &[T], out: &mut [T]) -> Result<()> {
        (**self).apply(t, y, params, out)
    }
}
