use crate::autodiff::{jacobian, Dual};
use crate::newton::{Newton, NonlinearSolver, Residual, SolveFailure, SolveReport};
use crate::traits::{lit, OdeSystem, Scalar};
use anyhow::Result;
use thiserror::Error;

/// Why a single step failed. The integrator adds step index and method.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("{0}")]
    Field(#[source] anyhow::Error),

    #[error("{0}")]
    Solve(#[source] SolveFailure),
}

impl From<SolveFailure> for StepError {
    fn from(failure: SolveFailure) -> Self {
        match failure {
            // A user function failing inside the solve is still a user function failure.
            SolveFailure::Residual(err) => StepError::Field(err),
            other => StepError::Solve(other),
        }
    }
}

/// R(x) = x - y_i - h * (w * f(t_{i+1}, x) + (1 - w) * f(t_i, y_i)).
///
/// Built fresh for every step and dropped once the step is committed.
struct StepResidual<'a, S: ?Sized, T: Scalar> {
    system: &'a S,
    t_next: T,
    h: T,
    weight: T,
    y_prev: &'a [T],
    explicit_slope: Option<&'a [T]>,
    params: &'a [T],
}

impl<S, T> Residual<T> for StepResidual<'_, S, T>
where
    T: Scalar,
    S: OdeSystem<T> + OdeSystem<Dual<T>> + ?Sized,
{
    fn dimension(&self) -> usize {
        self.y_prev.len()
    }

    fn evaluate(&self, x: &[T], out: &mut [T]) -> Result<()> {
        <S as OdeSystem<T>>::apply(self.system, self.t_next, x, self.params, out)?;
        let rest = T::one() - self.weight;
        for i in 0..x.len() {
            let mut slope = self.weight * out[i];
            if let Some(f_prev) = self.explicit_slope {
                slope = slope + rest * f_prev[i];
            }
            out[i] = x[i] - self.y_prev[i] - self.h * slope;
        }
        Ok(())
    }

    fn jacobian(&self, x: &[T], out: &mut [T]) -> Result<()> {
        // ∂R/∂x = I - w h J_f(t_{i+1}, x)
        jacobian(self.system, self.t_next, x, self.params, out)?;
        let n = x.len();
        let scale = self.weight * self.h;
        for i in 0..n {
            for j in 0..n {
                let identity = if i == j { T::one() } else { T::zero() };
                out[i * n + j] = identity - scale * out[i * n + j];
            }
        }
        Ok(())
    }
}

/// Backward (implicit) Euler: y_{i+1} = y_i + h f(t_{i+1}, y_{i+1}).
pub struct BackwardEuler<N: NonlinearSolver = Newton> {
    solver: N,
}

impl<N: NonlinearSolver> BackwardEuler<N> {
    pub fn new(solver: N) -> Self {
        Self { solver }
    }

    /// Solves for y_{i+1} starting from `guess` and writes it into `out`.
    #[allow(clippy::too_many_arguments)]
    pub fn step<T, S>(
        &mut self,
        system: &S,
        _t: T,
        t_next: T,
        h: T,
        y: &[T],
        guess: &[T],
        params: &[T],
        out: &mut [T],
    ) -> Result<SolveReport, StepError>
    where
        T: Scalar,
        S: OdeSystem<T> + OdeSystem<Dual<T>> + ?Sized,
    {
        let residual = StepResidual {
            system,
            t_next,
            h,
            weight: T::one(),
            y_prev: y,
            explicit_slope: None,
            params,
        };
        let mut y_next = guess.to_vec();
        let report = self.solver.solve(&residual, &mut y_next)?;
        out.copy_from_slice(&y_next);
        Ok(report)
    }
}

/// Crank-Nicolson: y_{i+1} = y_i + h/2 (f(t_i, y_i) + f(t_{i+1}, y_{i+1})).
pub struct CrankNicolson<T: Scalar, N: NonlinearSolver = Newton> {
    solver: N,
    f_prev: Vec<T>,
}

impl<T: Scalar, N: NonlinearSolver> CrankNicolson<T, N> {
    pub fn new(dim: usize, solver: N) -> Self {
        Self {
            solver,
            f_prev: vec![T::zero(); dim],
        }
    }

    /// Solves for y_{i+1} starting from `guess` and writes it into `out`.
    #[allow(clippy::too_many_arguments)]
    pub fn step<S>(
        &mut self,
        system: &S,
        t: T,
        t_next: T,
        h: T,
        y: &[T],
        guess: &[T],
        params: &[T],
        out: &mut [T],
    ) -> Result<SolveReport, StepError>
    where
        S: OdeSystem<T> + OdeSystem<Dual<T>> + ?Sized,
    {
        // f(t_i, y_i) is known, evaluate it once outside the solve.
        <S as OdeSystem<T>>::apply(system, t, y, params, &mut self.f_prev)
            .map_err(StepError::Field)?;

        let residual = StepResidual {
            system,
            t_next,
            h,
            weight: lit::<T>(0.5),
            y_prev: y,
            explicit_slope: Some(self.f_prev.as_slice()),
            params,
        };
        let mut y_next = guess.to_vec();
        let report = self.solver.solve(&residual, &mut y_next)?;
        out.copy_from_slice(&y_next);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::{BackwardEuler, CrankNicolson, StepError};
    use crate::newton::{Newton, NewtonSettings, SolveFailure};
    use crate::test_support::{Decay, Failing, LotkaVolterra};

    #[test]
    fn backward_euler_step_solves_linear_decay_exactly() {
        let mut stepper = BackwardEuler::new(Newton::default());
        let mut out = [0.0_f64];
        let report = stepper
            .step(&Decay, 0.0, 0.1, 0.1, &[1.0], &[1.0], &[], &mut out)
            .expect("step should converge");
        assert!(report.refined);
        assert!((out[0] - 1.0 / 1.1).abs() < 1e-12);
    }

    #[test]
    fn crank_nicolson_step_matches_pade_factor() {
        let mut stepper = CrankNicolson::new(1, Newton::default());
        let mut out = [0.0];
        let h: f64 = 0.1;
        stepper
            .step(&Decay, 0.0, h, h, &[1.0], &[1.0], &[], &mut out)
            .expect("step should converge");
        let expected = (1.0 - h / 2.0) / (1.0 + h / 2.0);
        assert!((out[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn implicit_step_zeroes_the_residual_on_a_nonlinear_system() {
        let params = [1.5, 1.0, 3.0, 1.0];
        let y = [10.0, 5.0];
        let h = 0.01;
        let mut out = [0.0_f64; 2];
        BackwardEuler::new(Newton::default())
            .step(&LotkaVolterra, 0.0, h, h, &y, &y, &params, &mut out)
            .expect("step should converge");

        let f0 = 1.5 * out[0] - out[0] * out[1];
        let f1 = -3.0 * out[1] + out[0] * out[1];
        assert!((out[0] - y[0] - h * f0).abs() < 1e-8);
        assert!((out[1] - y[1] - h * f1).abs() < 1e-8);
    }

    #[test]
    fn implicit_step_reports_exhausted_budget() {
        let settings = NewtonSettings {
            max_steps: 1,
            tolerance: 1e-14,
            ..NewtonSettings::default()
        };
        let params = [1.5, 1.0, 3.0, 1.0];
        let y = [10.0, 5.0];
        let mut out = [0.0; 2];
        let err = BackwardEuler::new(Newton::new(settings))
            .step(&LotkaVolterra, 0.0, 0.5, 0.5, &y, &y, &params, &mut out)
            .expect_err("expected failure");
        assert!(matches!(
            err,
            StepError::Solve(SolveFailure::NotConverged { .. })
        ));
    }

    #[test]
    fn field_failure_inside_solve_is_reported_as_field_error() {
        let system = Failing { after: 0.05 };
        let mut out = [0.0];
        let err = CrankNicolson::new(1, Newton::default())
            .step(&system, 0.0, 0.1, 0.1, &[1.0], &[1.0], &[], &mut out)
            .expect_err("expected failure");
        assert!(matches!(err, StepError::Field(_)));
    }
}
