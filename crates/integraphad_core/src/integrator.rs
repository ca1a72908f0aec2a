use crate::{
    autodiff::Dual,
    error::{IntegrationError, IntegrationResult},
    explicit::{Rk4, Trapezoid},
    grid::TimeGrid,
    implicit::{BackwardEuler, CrankNicolson, StepError},
    newton::{Newton, NewtonSettings, SolveReport},
    trajectory::StateTrajectory,
    traits::{value_of, OdeSystem, Scalar},
};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Integration schemes selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Method {
    #[default]
    #[serde(rename = "trapezoid")]
    Trapezoid,
    #[serde(rename = "rk4")]
    Rk4,
    #[serde(rename = "backEuler")]
    BackEuler,
    #[serde(rename = "crankNicolson")]
    CrankNicolson,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::Trapezoid,
        Method::Rk4,
        Method::BackEuler,
        Method::CrankNicolson,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Method::Trapezoid => "trapezoid",
            Method::Rk4 => "rk4",
            Method::BackEuler => "backEuler",
            Method::CrankNicolson => "crankNicolson",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|m| m.name()).collect()
    }

    pub fn is_implicit(self) -> bool {
        matches!(self, Method::BackEuler | Method::CrankNicolson)
    }

    /// Global order of accuracy.
    pub fn order(self) -> u32 {
        match self {
            Method::Trapezoid => 2,
            Method::Rk4 => 4,
            Method::BackEuler => 1,
            Method::CrankNicolson => 2,
        }
    }

    fn build<T: Scalar>(self, dim: usize, newton: Newton) -> InternalStepper<T> {
        match self {
            Method::Trapezoid => InternalStepper::Trapezoid(Trapezoid::new(dim)),
            Method::Rk4 => InternalStepper::Rk4(Rk4::new(dim)),
            Method::BackEuler => InternalStepper::BackEuler(BackwardEuler::new(newton)),
            Method::CrankNicolson => {
                InternalStepper::CrankNicolson(CrankNicolson::new(dim, newton))
            }
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = IntegrationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| IntegrationError::UnknownMethod {
                name: name.to_string(),
                available: Self::names(),
            })
    }
}

enum InternalStepper<T: Scalar> {
    Trapezoid(Trapezoid<T>),
    Rk4(Rk4<T>),
    BackEuler(BackwardEuler),
    CrankNicolson(CrankNicolson<T>),
}

impl<T: Scalar> InternalStepper<T> {
    /// Advances from `y` to `out`; implicit steppers also return their solve report.
    #[allow(clippy::too_many_arguments)]
    fn step<S>(
        &mut self,
        system: &S,
        t: T,
        t_next: T,
        h: T,
        y: &[T],
        params: &[T],
        out: &mut [T],
    ) -> Result<Option<SolveReport>, StepError>
    where
        S: OdeSystem<T> + OdeSystem<Dual<T>> + ?Sized,
    {
        match self {
            InternalStepper::Trapezoid(s) => s
                .step(system, t, h, y, params, out)
                .map(|_| None)
                .map_err(StepError::Field),
            InternalStepper::Rk4(s) => s
                .step(system, t, h, y, params, out)
                .map(|_| None)
                .map_err(StepError::Field),
            // The previous committed state seeds the solve.
            InternalStepper::BackEuler(s) => s
                .step(system, t, t_next, h, y, y, params, out)
                .map(Some),
            InternalStepper::CrankNicolson(s) => s
                .step(system, t, t_next, h, y, y, params, out)
                .map(Some),
        }
    }
}

/// Run configuration for `solve`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveOptions {
    pub num_steps: usize,
    pub method: Method,
    pub newton: NewtonSettings,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            num_steps: 100,
            method: Method::Trapezoid,
            newton: NewtonSettings::default(),
        }
    }
}

impl SolveOptions {
    pub fn with_num_steps(mut self, num_steps: usize) -> Self {
        self.num_steps = num_steps;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_newton(mut self, newton: NewtonSettings) -> Self {
        self.newton = newton;
        self
    }
}

/// Times and states produced by one integration run.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution<T: Scalar> {
    pub times: TimeGrid<T>,
    pub trajectory: StateTrajectory<T>,
    pub method: Method,
    /// One report per step for implicit methods, empty otherwise.
    pub reports: Vec<SolveReport>,
}

impl<T: Scalar> Solution<T> {
    pub fn final_state(&self) -> &[T] {
        self.trajectory.last()
    }

    /// Value parts of the trajectory, `(N+1) x D`.
    pub fn values(&self) -> DMatrix<f64> {
        self.trajectory.values()
    }

    pub fn time_values(&self) -> Vec<f64> {
        self.times.times().iter().map(|&t| value_of(t)).collect()
    }
}

/// Owns the time grid and the seeded trajectory for a system.
pub struct Integrator<S, T: Scalar> {
    system: S,
    grid: TimeGrid<T>,
    seed: StateTrajectory<T>,
    newton: NewtonSettings,
}

impl<S, T> Integrator<S, T>
where
    T: Scalar,
    S: OdeSystem<T> + OdeSystem<Dual<T>>,
{
    pub fn new(
        system: S,
        time_interval: (T, T),
        init_conditions: &[T],
        num_steps: usize,
    ) -> IntegrationResult<Self> {
        let expected = <S as OdeSystem<T>>::dimension(&system);
        if expected == 0 || init_conditions.len() != expected {
            return Err(IntegrationError::DimensionMismatch {
                expected,
                got: init_conditions.len(),
            });
        }
        let grid = TimeGrid::new(time_interval.0, time_interval.1, num_steps)?;
        let seed = StateTrajectory::seeded(init_conditions, num_steps)?;
        Ok(Self {
            system,
            grid,
            seed,
            newton: NewtonSettings::default(),
        })
    }

    pub fn with_newton(mut self, newton: NewtonSettings) -> Self {
        self.newton = newton;
        self
    }

    pub fn grid(&self) -> &TimeGrid<T> {
        &self.grid
    }

    pub fn initial_conditions(&self) -> &[T] {
        self.seed.initial()
    }

    /// Looks `method` up by name and runs it.
    pub fn integrate(&self, method: &str, params: &[T]) -> IntegrationResult<Solution<T>> {
        let method = method.parse::<Method>()?;
        self.integrate_with(method, params)
    }

    /// Runs every step of `method` in order. The first failing step aborts the run.
    pub fn integrate_with(&self, method: Method, params: &[T]) -> IntegrationResult<Solution<T>> {
        self.newton.validate()?;

        let dim = self.seed.dimension();
        let num_steps = self.grid.num_steps();
        let h = self.grid.step_size();
        let times = self.grid.times();

        let mut stepper = method.build::<T>(dim, Newton::new(self.newton));
        let mut trajectory = self.seed.clone();
        let mut reports = Vec::with_capacity(if method.is_implicit() { num_steps } else { 0 });
        let mut next = vec![T::zero(); dim];

        for i in 0..num_steps {
            let outcome = stepper.step(
                &self.system,
                times[i],
                times[i + 1],
                h,
                trajectory.last(),
                params,
                &mut next,
            );
            let report = match outcome {
                Ok(report) => report,
                Err(err) => {
                    let err = match err {
                        StepError::Field(source) => IntegrationError::StepFunction {
                            step: i,
                            method,
                            source,
                        },
                        StepError::Solve(source) => IntegrationError::NonConvergence {
                            step: i,
                            method,
                            source,
                        },
                    };
                    warn!(step = i, %method, error = %err, "integration aborted");
                    return Err(err);
                }
            };

            if next.iter().any(|v| !v.is_finite()) {
                warn!(step = i, %method, "non-finite state, integration aborted");
                return Err(IntegrationError::NonFiniteState { step: i, method });
            }

            if let Some(report) = report {
                debug!(
                    step = i,
                    iterations = report.iterations,
                    residual_norm = report.residual_norm,
                    "implicit step converged"
                );
                reports.push(report);
            }
            trajectory.commit(&next)?;
        }

        info!(%method, num_steps, dim, "integration finished");

        Ok(Solution {
            times: self.grid.clone(),
            trajectory,
            method,
            reports,
        })
    }
}

/// One-call integration: builds an `Integrator` and runs `options.method`.
pub fn solve<S, T>(
    system: S,
    time_interval: (T, T),
    init_conditions: &[T],
    params: &[T],
    options: SolveOptions,
) -> IntegrationResult<Solution<T>>
where
    T: Scalar,
    S: OdeSystem<T> + OdeSystem<Dual<T>>,
{
    Integrator::new(system, time_interval, init_conditions, options.num_steps)?
        .with_newton(options.newton)
        .integrate_with(options.method, params)
}
