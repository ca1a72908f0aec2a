use crate::error::{IntegrationError, IntegrationResult};
use crate::traits::{value_of, Scalar};

/// Uniform time grid t_0 < t_1 < ... < t_N with spacing h = (t_F - t_0) / N.
///
/// Points are built as t_0 + (t_F - t_0) * (i / N), so the last point is t_F
/// exactly and the grid stays differentiable in both bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid<T: Scalar> {
    times: Vec<T>,
    step: T,
}

impl<T: Scalar> TimeGrid<T> {
    pub fn new(t0: T, t_final: T, num_steps: usize) -> IntegrationResult<Self> {
        let invalid = |what: String| IntegrationError::InvalidInterval { what };
        if num_steps < 1 {
            return Err(invalid("num_steps must be at least 1.".to_string()));
        }
        if !(t0.is_finite() && t_final.is_finite()) {
            return Err(invalid("time bounds must be finite.".to_string()));
        }
        if t_final == t0 || value_of(t_final) == value_of(t0) {
            return Err(invalid(format!(
                "zero-length interval [{}, {}].",
                value_of(t0),
                value_of(t_final)
            )));
        }
        if t_final < t0 {
            return Err(invalid(format!(
                "final time {} precedes initial time {}.",
                value_of(t_final),
                value_of(t0)
            )));
        }

        let n = T::from_usize(num_steps).unwrap_or_else(T::nan);
        let span = t_final - t0;
        let mut times = Vec::with_capacity(num_steps + 1);
        for i in 0..num_steps {
            let fraction = T::from_usize(i).unwrap_or_else(T::nan) / n;
            times.push(t0 + span * fraction);
        }
        times.push(t_final);

        Ok(Self {
            times,
            step: span / n,
        })
    }

    pub fn step_size(&self) -> T {
        self.step
    }

    pub fn num_steps(&self) -> usize {
        self.times.len() - 1
    }

    pub fn times(&self) -> &[T] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.times.get(index).copied()
    }
}
