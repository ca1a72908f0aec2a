pub mod autodiff;
pub mod error;
pub mod explicit;
pub mod grid;
pub mod implicit;
pub mod integrator;
pub mod newton;
pub mod sensitivity;
pub mod trajectory;
/// The `integraphad_core` crate integrates first-order ODE systems dy/dt = f(t, y, params)
/// with fixed-step schemes that stay differentiable end to end.
/// Everything is generic over a `Scalar`, so the same run works in `f64` or in
/// Dual numbers, which carry derivatives with respect to initial conditions,
/// parameters or time bounds through every step, including the Newton solves.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `OdeSystem` (right-hand side).
/// - **Grid / Trajectory**: uniform time grid and the write-once table of states.
/// - **Steppers**: explicit trapezoid and RK4, implicit backward Euler and Crank-Nicolson.
/// - **Newton**: the nonlinear solve behind the implicit steppers.
/// - **Integrator**: method registry, step loop, and the one-call `solve`.
/// - **Sensitivity**: forward-mode derivatives of a whole trajectory.
pub mod traits;

#[cfg(test)]
mod test_support;

pub use error::{IntegrationError, IntegrationResult};
pub use integrator::{solve, Integrator, Method, Solution, SolveOptions};
pub use traits::{OdeSystem, Scalar};
