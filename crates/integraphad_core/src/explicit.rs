use crate::traits::{lit, OdeSystem, Scalar};
use anyhow::Result;

/// Explicit trapezoid (Heun) stepper.
///
/// Single predictor-corrector pass: the Euler guess is used once to evaluate
/// the slope at t + h. Unlike the implicit trapezoid rule, the corrector is
/// never iterated to convergence.
pub struct Trapezoid<T: Scalar> {
    f0: Vec<T>,
    f1: Vec<T>,
    guess: Vec<T>,
}

impl<T: Scalar> Trapezoid<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            f0: vec![T::zero(); dim],
            f1: vec![T::zero(); dim],
            guess: vec![T::zero(); dim],
        }
    }

    /// Writes y_{i+1} into `out`.
    pub fn step<S: OdeSystem<T> + ?Sized>(
        &mut self,
        system: &S,
        t: T,
        h: T,
        y: &[T],
        params: &[T],
        out: &mut [T],
    ) -> Result<()> {
        let half = lit::<T>(0.5);

        // predictor: y + h f(t, y)
        system.apply(t, y, params, &mut self.f0)?;
        for i in 0..y.len() {
            self.guess[i] = y[i] + h * self.f0[i];
        }

        // corrector: y + h/2 (f(t, y) + f(t + h, guess))
        system.apply(t + h, &self.guess, params, &mut self.f1)?;
        for i in 0..y.len() {
            out[i] = y[i] + h * half * (self.f0[i] + self.f1[i]);
        }

        Ok(())
    }
}

/// Classic Runge-Kutta 4th Order Solver
pub struct Rk4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> Rk4<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![T::zero(); dim],
            k2: vec![T::zero(); dim],
            k3: vec![T::zero(); dim],
            k4: vec![T::zero(); dim],
            tmp: vec![T::zero(); dim],
        }
    }

    /// Writes y_{i+1} into `out`.
    pub fn step<S: OdeSystem<T> + ?Sized>(
        &mut self,
        system: &S,
        t: T,
        h: T,
        y: &[T],
        params: &[T],
        out: &mut [T],
    ) -> Result<()> {
        let half = lit::<T>(0.5);
        let sixth = lit::<T>(1.0 / 6.0);
        let two = lit::<T>(2.0);

        // k1 = f(t, y)
        system.apply(t, y, params, &mut self.k1)?;

        // k2 = f(t + h/2, y + h*k1/2)
        for i in 0..y.len() {
            self.tmp[i] = y[i] + h * self.k1[i] * half;
        }
        system.apply(t + h * half, &self.tmp, params, &mut self.k2)?;

        // k3 = f(t + h/2, y + h*k2/2)
        for i in 0..y.len() {
            self.tmp[i] = y[i] + h * self.k2[i] * half;
        }
        system.apply(t + h * half, &self.tmp, params, &mut self.k3)?;

        // k4 = f(t + h, y + h*k3)
        for i in 0..y.len() {
            self.tmp[i] = y[i] + h * self.k3[i];
        }
        system.apply(t + h, &self.tmp, params, &mut self.k4)?;

        // y_next = y + h/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..y.len() {
            out[i] = y[i]
                + h * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        Ok(())
    }
}
