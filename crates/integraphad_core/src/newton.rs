use crate::error::{IntegrationError, IntegrationResult};
use crate::traits::{lit, value_of, Scalar};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A square nonlinear system R(x) = 0 whose root is sought.
pub trait Residual<T: Scalar> {
    fn dimension(&self) -> usize;

    /// Writes R(x) into `out`.
    fn evaluate(&self, x: &[T], out: &mut [T]) -> Result<()>;

    /// Writes ∂R/∂x at `x` into `out` (row-major, `dim * dim`).
    fn jacobian(&self, x: &[T], out: &mut [T]) -> Result<()>;
}

/// Capability that drives a residual to zero.
///
/// `state` holds the initial guess on entry and the root on successful exit.
/// Solvers must only use differentiable arithmetic on `T`, so that tangents
/// carried by `state` and the residual flow through to the root.
pub trait NonlinearSolver {
    fn solve<T: Scalar, R: Residual<T>>(
        &self,
        residual: &R,
        state: &mut [T],
    ) -> Result<SolveReport, SolveFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-8,
        }
    }
}

impl NewtonSettings {
    pub fn validate(&self) -> IntegrationResult<()> {
        let invalid = |what: &str| IntegrationError::InvalidSettings {
            what: what.to_string(),
        };
        if self.max_steps == 0 {
            return Err(invalid("max_steps must be greater than zero."));
        }
        if !(self.damping.is_finite() && self.damping > 0.0) {
            return Err(invalid("damping must be positive."));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(invalid("tolerance must be positive."));
        }
        Ok(())
    }
}

/// Outcome of a converged solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub iterations: usize,
    /// ‖R(x)‖ at the returned root, always within the tolerance.
    pub residual_norm: f64,
    /// Whether the post-convergence correction was kept. When it is not (for
    /// example a singular Jacobian at the root) tangents on the root are those
    /// of the last converged iterate.
    pub refined: bool,
}

#[derive(Error, Debug)]
pub enum SolveFailure {
    #[error("Newton solver failed to converge in {iterations} steps (‖R(x)‖ = {residual_norm})")]
    NotConverged {
        iterations: usize,
        residual_norm: f64,
    },

    #[error("Newton iterate diverged at iteration {iteration} (non-finite residual)")]
    Diverged { iteration: usize },

    #[error("Residual Jacobian is singular at iteration {iteration}")]
    SingularJacobian { iteration: usize },

    #[error("Residual evaluation failed: {0}")]
    Residual(#[source] anyhow::Error),
}

/// Damped Newton iteration with a dense Jacobian.
#[derive(Debug, Clone, Copy, Default)]
pub struct Newton {
    pub settings: NewtonSettings,
}

impl Newton {
    pub fn new(settings: NewtonSettings) -> Self {
        Self { settings }
    }
}

impl NonlinearSolver for Newton {
    fn solve<T: Scalar, R: Residual<T>>(
        &self,
        residual: &R,
        state: &mut [T],
    ) -> Result<SolveReport, SolveFailure> {
        let dim = residual.dimension();
        let mut work = NewtonWork {
            damping: lit::<T>(self.settings.damping),
            values: vec![T::zero(); dim],
            jacobian: vec![T::zero(); dim * dim],
        };
        residual
            .evaluate(state, &mut work.values)
            .map_err(SolveFailure::Residual)?;
        let mut residual_norm = l2_norm(&work.values);
        let mut iterations = 0usize;

        loop {
            if !residual_norm.is_finite() {
                return Err(SolveFailure::Diverged {
                    iteration: iterations,
                });
            }
            if residual_norm <= self.settings.tolerance {
                break;
            }
            if iterations >= self.settings.max_steps {
                return Err(SolveFailure::NotConverged {
                    iterations,
                    residual_norm,
                });
            }
            residual_norm = work.correct(residual, state, iterations)?;
            iterations += 1;
        }

        // One more correction from the converged iterate: tangents carried by `T`
        // then match the implicit-function derivative to within the tolerance.
        // It is applied to a copy and kept only if the residual stays converged.
        let mut candidate = state.to_vec();
        let refined = match work.correct(residual, &mut candidate, iterations) {
            Ok(norm) if norm <= self.settings.tolerance => {
                state.copy_from_slice(&candidate);
                residual_norm = norm;
                iterations += 1;
                true
            }
            Ok(_) | Err(SolveFailure::SingularJacobian { .. }) => false,
            Err(err) => return Err(err),
        };

        Ok(SolveReport {
            iterations,
            residual_norm,
            refined,
        })
    }
}

struct NewtonWork<T: Scalar> {
    damping: T,
    values: Vec<T>,
    jacobian: Vec<T>,
}

impl<T: Scalar> NewtonWork<T> {
    /// x <- x - damping * J(x)^-1 R(x), then re-evaluates R. `values` must hold R(x) on entry.
    fn correct<R: Residual<T>>(
        &mut self,
        residual: &R,
        state: &mut [T],
        iteration: usize,
    ) -> Result<f64, SolveFailure> {
        let dim = self.values.len();
        residual
            .jacobian(state, &mut self.jacobian)
            .map_err(SolveFailure::Residual)?;
        let delta = solve_linear_system(dim, &mut self.jacobian, &self.values)
            .ok_or(SolveFailure::SingularJacobian { iteration })?;

        for i in 0..dim {
            state[i] = state[i] - self.damping * delta[i];
        }

        residual
            .evaluate(state, &mut self.values)
            .map_err(SolveFailure::Residual)?;
        Ok(l2_norm(&self.values))
    }
}

/// Solves `A x = b` by Gaussian elimination with partial pivoting.
/// `a` is row-major and is overwritten. Returns `None` when a pivot vanishes.
pub fn solve_linear_system<T: Scalar>(dim: usize, a: &mut [T], b: &[T]) -> Option<Vec<T>> {
    let mut rhs = b.to_vec();

    for col in 0..dim {
        let mut pivot_row = col;
        let mut pivot_mag = value_of(a[col * dim + col].abs());
        for row in (col + 1)..dim {
            let mag = value_of(a[row * dim + col].abs());
            if mag > pivot_mag {
                pivot_row = row;
                pivot_mag = mag;
            }
        }
        if !(pivot_mag > f64::MIN_POSITIVE) {
            return None;
        }
        if pivot_row != col {
            for k in 0..dim {
                a.swap(col * dim + k, pivot_row * dim + k);
            }
            rhs.swap(col, pivot_row);
        }

        let pivot = a[col * dim + col];
        for row in (col + 1)..dim {
            let factor = a[row * dim + col] / pivot;
            if factor.is_zero() {
                continue;
            }
            for k in col..dim {
                a[row * dim + k] = a[row * dim + k] - factor * a[col * dim + k];
            }
            rhs[row] = rhs[row] - factor * rhs[col];
        }
    }

    let mut x = vec![T::zero(); dim];
    for row in (0..dim).rev() {
        let mut sum = rhs[row];
        for k in (row + 1)..dim {
            sum = sum - a[row * dim + k] * x[k];
        }
        x[row] = sum / a[row * dim + row];
    }
    Some(x)
}

fn l2_norm<T: Scalar>(values: &[T]) -> f64 {
    values
        .iter()
        .map(|&v| value_of(v))
        .map(|v| v * v)
        .sum::<f64>()
        .sqrt()
}
