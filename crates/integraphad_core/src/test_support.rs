//! Reference systems shared by the unit tests.

use crate::traits::{OdeSystem, Scalar};
use anyhow::{bail, Result};
use std::fmt::{Debug, Display};

pub fn assert_err_contains<T: Debug, E: Display>(result: Result<T, E>, needle: &str) {
    let err = match result {
        Ok(value) => panic!("expected error, got {value:?}"),
        Err(err) => err,
    };
    let message = format!("{err}");
    assert!(
        message.contains(needle),
        "expected error to contain \"{needle}\", got \"{message}\""
    );
}

/// dy/dt = -k y, with k = params[0] or 1 when no parameter is given.
#[derive(Clone, Copy)]
pub struct Decay;

impl<T: Scalar> OdeSystem<T> for Decay {
    fn dimension(&self) -> usize {
        1
    }

    fn apply(&self, _t: T, y: &[T], params: &[T], out: &mut [T]) -> Result<()> {
        let rate = params.first().copied().unwrap_or_else(T::one);
        out[0] = -rate * y[0];
        Ok(())
    }
}

/// Predator-prey system with params [a, b, c, d].
#[derive(Clone, Copy)]
pub struct LotkaVolterra;

impl<T: Scalar> OdeSystem<T> for LotkaVolterra {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: T, y: &[T], params: &[T], out: &mut [T]) -> Result<()> {
        let (a, b, c, d) = (params[0], params[1], params[2], params[3]);
        out[0] = a * y[0] - b * y[0] * y[1];
        out[1] = -c * y[1] + d * y[0] * y[1];
        Ok(())
    }
}

/// dy/dt = y², which blows up at t = 1 from y(0) = 1.
#[derive(Clone, Copy)]
pub struct Blowup;

impl<T: Scalar> OdeSystem<T> for Blowup {
    fn dimension(&self) -> usize {
        1
    }

    fn apply(&self, _t: T, y: &[T], _params: &[T], out: &mut [T]) -> Result<()> {
        out[0] = y[0] * y[0];
        Ok(())
    }
}

/// dy/dt = y - y³. Its implicit residual at y = 0 is x³, with a singular Jacobian.
#[derive(Clone, Copy)]
pub struct Stationary;

impl<T: Scalar> OdeSystem<T> for Stationary {
    fn dimension(&self) -> usize {
        1
    }

    fn apply(&self, _t: T, y: &[T], _params: &[T], out: &mut [T]) -> Result<()> {
        out[0] = y[0] - y[0] * y[0] * y[0];
        Ok(())
    }
}

/// dy/dt = -k sqrt(y) with k = params[0], undefined for y < 0.
#[derive(Clone, Copy)]
pub struct SqrtDrain;

impl<T: Scalar> OdeSystem<T> for SqrtDrain {
    fn dimension(&self) -> usize {
        1
    }

    fn apply(&self, _t: T, y: &[T], params: &[T], out: &mut [T]) -> Result<()> {
        out[0] = -params[0] * y[0].sqrt();
        Ok(())
    }
}

/// Decay that refuses to evaluate past `after`.
#[derive(Clone, Copy)]
pub struct Failing {
    pub after: f64,
}

impl<T: Scalar> OdeSystem<T> for Failing {
    fn dimension(&self) -> usize {
        1
    }

    fn apply(&self, t: T, y: &[T], _params: &[T], out: &mut [T]) -> Result<()> {
        let t = t.to_f64().unwrap_or(f64::NAN);
        if t > self.after {
            bail!("vector field failed at t = {t}");
        }
        out[0] = -y[0];
        Ok(())
    }
}
