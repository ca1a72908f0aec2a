use crate::{
    autodiff::Dual,
    error::{IntegrationError, IntegrationResult},
    integrator::{solve, Method, SolveOptions},
    traits::OdeSystem,
};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Input that carries the unit tangent through an integration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Seed {
    Initial(usize),
    Parameter(usize),
    InitialTime,
    FinalTime,
}

/// Trajectory values together with their derivatives with respect to the seed.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensitivity {
    pub seed: Seed,
    pub method: Method,
    pub times: Vec<f64>,
    /// `(N+1) x D` state values.
    pub values: DMatrix<f64>,
    /// `(N+1) x D` derivatives d y_i / d seed.
    pub derivatives: DMatrix<f64>,
}

/// Forward-mode sensitivity of the whole trajectory to one input.
///
/// Runs the selected scheme in `Dual<f64>`, so the derivative is exact for the
/// discrete scheme (up to the Newton tolerance for implicit methods).
pub fn sensitivity<S>(
    system: S,
    time_interval: (f64, f64),
    init_conditions: &[f64],
    params: &[f64],
    seed: Seed,
    options: SolveOptions,
) -> IntegrationResult<Sensitivity>
where
    S: OdeSystem<Dual> + OdeSystem<Dual<Dual>>,
{
    match seed {
        Seed::Initial(k) if k >= init_conditions.len() => {
            return Err(IntegrationError::InvalidSeed {
                what: format!(
                    "initial condition index {} out of range for dimension {}.",
                    k,
                    init_conditions.len()
                ),
            });
        }
        Seed::Parameter(k) if k >= params.len() => {
            return Err(IntegrationError::InvalidSeed {
                what: format!(
                    "parameter index {} out of range for {} parameters.",
                    k,
                    params.len()
                ),
            });
        }
        _ => {}
    }

    let lift = |values: &[f64], hot: Option<usize>| -> Vec<Dual> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                if hot == Some(i) {
                    Dual::variable(v)
                } else {
                    Dual::constant(v)
                }
            })
            .collect()
    };

    let dual_init = lift(
        init_conditions,
        match seed {
            Seed::Initial(k) => Some(k),
            _ => None,
        },
    );
    let dual_params = lift(
        params,
        match seed {
            Seed::Parameter(k) => Some(k),
            _ => None,
        },
    );
    let (t0, t_final) = time_interval;
    let dual_interval = match seed {
        Seed::InitialTime => (Dual::variable(t0), Dual::constant(t_final)),
        Seed::FinalTime => (Dual::constant(t0), Dual::variable(t_final)),
        _ => (Dual::constant(t0), Dual::constant(t_final)),
    };

    let solution = solve(system, dual_interval, &dual_init, &dual_params, options)?;
    let trajectory = &solution.trajectory;
    let derivatives = DMatrix::from_row_iterator(
        trajectory.len(),
        trajectory.dimension(),
        trajectory.rows().flat_map(|row| row.iter().map(|v| v.eps)),
    );

    Ok(Sensitivity {
        seed,
        method: solution.method,
        times: solution.time_values(),
        values: solution.values(),
        derivatives,
    })
}

#[cfg(test)]
mod tests {
    use super::{sensitivity, Seed};
    use crate::integrator::{solve, Method, SolveOptions};
    use crate::test_support::{assert_err_contains, Decay, LotkaVolterra};

    const LV_PARAMS: [f64; 4] = [1.5, 1.0, 3.0, 1.0];

    fn final_derivative(seed: Seed, method: Method, num_steps: usize) -> f64 {
        let options = SolveOptions::default()
            .with_method(method)
            .with_num_steps(num_steps);
        let result = sensitivity(Decay, (0.0, 1.0), &[1.0], &[1.0], seed, options)
            .expect("sensitivity should compute");
        result.derivatives[(num_steps, 0)]
    }

    #[test]
    fn decay_sensitivities_match_analytic_derivatives() {
        let e = (-1.0_f64).exp();
        // y(T) = y0 exp(-k (T - t0))
        let cases = [
            (Seed::Initial(0), e),
            (Seed::Parameter(0), -e),
            (Seed::FinalTime, -e),
            (Seed::InitialTime, e),
        ];
        for (seed, expected) in cases {
            let got = final_derivative(seed, Method::Rk4, 100);
            assert!((got - expected).abs() < 1e-8, "{seed:?}: {got} vs {expected}");
        }
    }

    #[test]
    fn backward_euler_parameter_sensitivity_is_exact_for_the_scheme() {
        // y_N = (1 + k h)^-N, so dy_N/dk = -N h (1 + k h)^(-N-1).
        let n = 100;
        let h = 1.0 / n as f64;
        let expected = -(n as f64) * h * (1.0 + h).powi(-(n as i32) - 1);
        let got = final_derivative(Seed::Parameter(0), Method::BackEuler, n);
        assert!((got - expected).abs() < 1e-12, "{got} vs {expected}");
    }

    #[test]
    fn lotka_volterra_sensitivities_match_finite_differences() {
        let init = [10.0, 5.0];
        let delta = 1e-6;
        for method in Method::ALL {
            let options = SolveOptions::default()
                .with_method(method)
                .with_num_steps(100);
            let result = sensitivity(
                LotkaVolterra,
                (0.0, 1.0),
                &init,
                &LV_PARAMS,
                Seed::Parameter(0),
                options,
            )
            .expect("sensitivity should compute");

            let run = |a: f64| {
                let mut params = LV_PARAMS;
                params[0] = a;
                solve(LotkaVolterra, (0.0, 1.0), &init, &params, options)
                    .expect("lotka-volterra should integrate")
                    .final_state()
                    .to_vec()
            };
            let plus = run(LV_PARAMS[0] + delta);
            let minus = run(LV_PARAMS[0] - delta);
            for j in 0..2 {
                let fd = (plus[j] - minus[j]) / (2.0 * delta);
                let ad = result.derivatives[(100, j)];
                assert!(
                    (fd - ad).abs() <= 1e-4 * (1.0 + fd.abs()),
                    "{method} component {j}: ad {ad} vs fd {fd}"
                );
            }
            assert_eq!(result.values.row(0)[0], 10.0);
            assert_eq!(result.derivatives.row(0)[0], 0.0);
        }
    }

    #[test]
    fn out_of_range_seeds_are_rejected() {
        let options = SolveOptions::default();
        assert_err_contains(
            sensitivity(Decay, (0.0, 1.0), &[1.0], &[], Seed::Initial(1), options),
            "initial condition index 1",
        );
        assert_err_contains(
            sensitivity(Decay, (0.0, 1.0), &[1.0], &[], Seed::Parameter(0), options),
            "parameter index 0",
        );
    }
}
