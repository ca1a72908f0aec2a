use crate::traits::{lit, OdeSystem, Scalar};
use anyhow::{bail, Result};
use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// Dual number for forward-mode AD.
/// val: real part
/// eps: infinitesimal part
///
/// Generic over the underlying scalar so duals nest: `Dual<Dual<f64>>` gives the
/// Jacobian of a computation that is itself being differentiated.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual<T: Scalar = f64> {
    pub val: T,
    pub eps: T,
}

impl<T: Scalar> Dual<T> {
    pub fn new(val: T, eps: T) -> Self {
        Self { val, eps }
    }

    /// A value with zero tangent.
    pub fn constant(val: T) -> Self {
        Self::new(val, T::zero())
    }

    /// A value seeded with unit tangent.
    pub fn variable(val: T) -> Self {
        Self::new(val, T::one())
    }

    fn chain(self, val: T, deriv: T) -> Self {
        Self::new(val, deriv * self.eps)
    }
}

impl<T: Scalar> Zero for Dual<T> {
    fn zero() -> Self {
        Self::constant(T::zero())
    }
    fn is_zero(&self) -> bool {
        self.val.is_zero() && self.eps.is_zero()
    }
}

impl<T: Scalar> One for Dual<T> {
    fn one() -> Self {
        Self::constant(T::one())
    }
}

impl<T: Scalar> Add for Dual<T> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl<T: Scalar> Sub for Dual<T> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl<T: Scalar> Mul for Dual<T> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl<T: Scalar> Div for Dual<T> {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl<T: Scalar> Neg for Dual<T> {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl<T: Scalar> Rem for Dual<T> {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // a % b = a - trunc(a / b) * b
        let q = (self.val / rhs.val).trunc();
        Self::new(self.val % rhs.val, self.eps - q * rhs.eps)
    }
}

impl<T: Scalar> AddAssign for Dual<T> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl<T: Scalar> SubAssign for Dual<T> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl<T: Scalar> MulAssign for Dual<T> {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
impl<T: Scalar> DivAssign for Dual<T> {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}
impl<T: Scalar> RemAssign for Dual<T> {
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl<T: Scalar> Num for Dual<T> {
    type FromStrRadixErr = ();
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        T::from_str_radix(str, radix)
            .map(Self::constant)
            .map_err(|_| ())
    }
}

impl<T: Scalar> ToPrimitive for Dual<T> {
    fn to_i64(&self) -> Option<i64> {
        self.val.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.val.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        self.val.to_f64()
    }
}

impl<T: Scalar> FromPrimitive for Dual<T> {
    fn from_i64(n: i64) -> Option<Self> {
        T::from_i64(n).map(Self::constant)
    }
    fn from_u64(n: u64) -> Option<Self> {
        T::from_u64(n).map(Self::constant)
    }
    fn from_f64(n: f64) -> Option<Self> {
        T::from_f64(n).map(Self::constant)
    }
}

impl<T: Scalar> NumCast for Dual<T> {
    fn from<N: ToPrimitive>(n: N) -> Option<Self> {
        <T as NumCast>::from(n).map(Self::constant)
    }
}

impl<T: Scalar> Float for Dual<T> {
    fn nan() -> Self {
        Self::constant(T::nan())
    }
    fn infinity() -> Self {
        Self::constant(T::infinity())
    }
    fn neg_infinity() -> Self {
        Self::constant(T::neg_infinity())
    }
    fn neg_zero() -> Self {
        Self::new(T::neg_zero(), T::neg_zero())
    }
    fn min_value() -> Self {
        Self::constant(T::min_value())
    }
    fn min_positive_value() -> Self {
        Self::constant(T::min_positive_value())
    }
    fn max_value() -> Self {
        Self::constant(T::max_value())
    }
    fn is_nan(self) -> bool {
        self.val.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.val.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.val.is_finite()
    }
    fn is_normal(self) -> bool {
        self.val.is_normal()
    }
    fn classify(self) -> std::num::FpCategory {
        self.val.classify()
    }
    fn floor(self) -> Self {
        Self::constant(self.val.floor())
    }
    fn ceil(self) -> Self {
        Self::constant(self.val.ceil())
    }
    fn round(self) -> Self {
        Self::constant(self.val.round())
    }
    fn trunc(self) -> Self {
        Self::constant(self.val.trunc())
    }
    fn fract(self) -> Self {
        Self::new(self.val.fract(), self.eps)
    }
    fn abs(self) -> Self {
        if self.val >= T::zero() {
            self
        } else {
            -self
        }
    }
    fn signum(self) -> Self {
        Self::constant(self.val.signum())
    }
    fn is_sign_positive(self) -> bool {
        self.val.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.val.is_sign_negative()
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        Self::one() / self
    }

    fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::one();
        }
        let deriv = lit::<T>(n as f64) * self.val.powi(n - 1);
        self.chain(self.val.powi(n), deriv)
    }

    fn powf(self, n: Self) -> Self {
        // x^y = exp(y * ln(x))
        let val_pow = self.val.powf(n.val);
        let eps_new = val_pow * (n.eps * self.val.ln() + n.val * self.eps / self.val);
        Self::new(val_pow, eps_new)
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        self.chain(s, (lit::<T>(2.0) * s).recip())
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        self.chain(e, e)
    }

    fn exp2(self) -> Self {
        let e = self.val.exp2();
        self.chain(e, e * lit::<T>(std::f64::consts::LN_2))
    }
    fn ln(self) -> Self {
        self.chain(self.val.ln(), self.val.recip())
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        let scale = self.val * lit::<T>(std::f64::consts::LN_2);
        self.chain(self.val.log2(), scale.recip())
    }
    fn log10(self) -> Self {
        let scale = self.val * lit::<T>(std::f64::consts::LN_10);
        self.chain(self.val.log10(), scale.recip())
    }

    fn max(self, other: Self) -> Self {
        if self.val > other.val {
            self
        } else {
            other
        }
    }
    fn min(self, other: Self) -> Self {
        if self.val < other.val {
            self
        } else {
            other
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        if self.val > other.val {
            self - other
        } else {
            Self::zero()
        }
    }

    fn cbrt(self) -> Self {
        let c = self.val.cbrt();
        self.chain(c, (lit::<T>(3.0) * c * c).recip())
    }
    fn hypot(self, other: Self) -> Self {
        let h = self.val.hypot(other.val);
        Self::new(h, (self.val * self.eps + other.val * other.eps) / h)
    }

    fn sin(self) -> Self {
        self.chain(self.val.sin(), self.val.cos())
    }
    fn cos(self) -> Self {
        self.chain(self.val.cos(), -self.val.sin())
    }
    fn tan(self) -> Self {
        let t = self.val.tan();
        self.chain(t, T::one() + t * t)
    }
    fn asin(self) -> Self {
        let d = (T::one() - self.val * self.val).sqrt().recip();
        self.chain(self.val.asin(), d)
    }
    fn acos(self) -> Self {
        let d = -(T::one() - self.val * self.val).sqrt().recip();
        self.chain(self.val.acos(), d)
    }
    fn atan(self) -> Self {
        let d = (T::one() + self.val * self.val).recip();
        self.chain(self.val.atan(), d)
    }
    fn atan2(self, other: Self) -> Self {
        // self is y, other is x
        let denom = self.val * self.val + other.val * other.val;
        Self::new(
            self.val.atan2(other.val),
            (other.val * self.eps - self.val * other.eps) / denom,
        )
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn exp_m1(self) -> Self {
        self.chain(self.val.exp_m1(), self.val.exp())
    }
    fn ln_1p(self) -> Self {
        self.chain(self.val.ln_1p(), (T::one() + self.val).recip())
    }
    fn sinh(self) -> Self {
        self.chain(self.val.sinh(), self.val.cosh())
    }
    fn cosh(self) -> Self {
        self.chain(self.val.cosh(), self.val.sinh())
    }
    fn tanh(self) -> Self {
        let t = self.val.tanh();
        self.chain(t, T::one() - t * t)
    }
    fn asinh(self) -> Self {
        let d = (self.val * self.val + T::one()).sqrt().recip();
        self.chain(self.val.asinh(), d)
    }
    fn acosh(self) -> Self {
        let d = (self.val * self.val - T::one()).sqrt().recip();
        self.chain(self.val.acosh(), d)
    }
    fn atanh(self) -> Self {
        let d = (T::one() - self.val * self.val).recip();
        self.chain(self.val.atanh(), d)
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.val.integer_decode()
    }
}

/// Computes ∂f/∂y at (t, y) into `out` (row-major, `dim * dim`).
///
/// Column j comes from evaluating the system with y_j carrying a unit tangent.
/// Works for any `T`, including `Dual<f64>`, through the nested dual type.
pub fn jacobian<T, S>(system: &S, t: T, y: &[T], params: &[T], out: &mut [T]) -> Result<()>
where
    T: Scalar,
    S: OdeSystem<Dual<T>> + ?Sized,
{
    let dim = y.len();
    if out.len() != dim * dim {
        bail!(
            "Jacobian buffer has length {}, expected {}.",
            out.len(),
            dim * dim
        );
    }

    let dual_params: Vec<Dual<T>> = params.iter().map(|&p| Dual::constant(p)).collect();
    let mut dual_y: Vec<Dual<T>> = y.iter().map(|&v| Dual::constant(v)).collect();
    let mut dual_out = vec![Dual::<T>::zero(); dim];
    let t_dual = Dual::constant(t);

    for j in 0..dim {
        dual_y[j].eps = T::one();
        system.apply(t_dual, &dual_y, &dual_params, &mut dual_out)?;
        dual_y[j].eps = T::zero();
        for i in 0..dim {
            out[i * dim + j] = dual_out[i].eps;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{jacobian, Dual};
    use crate::test_support::LotkaVolterra;
    use num_traits::Float;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn dual_arithmetic_follows_product_and_quotient_rules() {
        let x = Dual::variable(3.0);
        let y = Dual::constant(2.0);
        let p = x * x * y;
        assert!(close(p.val, 18.0));
        assert!(close(p.eps, 12.0));

        let q = y / x;
        assert!(close(q.val, 2.0 / 3.0));
        assert!(close(q.eps, -2.0 / 9.0));
    }

    #[test]
    fn dual_elementary_functions_match_closed_form_derivatives() {
        let x = Dual::variable(0.7);
        assert!(close(x.exp().eps, 0.7_f64.exp()));
        assert!(close(x.ln().eps, 1.0 / 0.7));
        assert!(close(x.sin().eps, 0.7_f64.cos()));
        assert!(close(x.sqrt().eps, 0.5 / 0.7_f64.sqrt()));
        assert!(close(x.powi(3).eps, 3.0 * 0.49));
        assert!(close(x.tanh().eps, 1.0 - 0.7_f64.tanh().powi(2)));
        assert!(close(x.atan().eps, 1.0 / (1.0 + 0.49)));
        assert!(close((-x).abs().eps, 1.0));
        assert!(close(x.powi(0).eps, 0.0));
    }

    #[test]
    fn nested_duals_give_second_derivatives() {
        // d²/dx² x³ at x = 2 is 12.
        let x = Dual::new(Dual::variable(2.0), Dual::constant(1.0));
        let cube = x * x * x;
        assert!(close(cube.val.val, 8.0));
        assert!(close(cube.eps.val, 12.0));
        assert!(close(cube.eps.eps, 12.0));
    }

    #[test]
    fn jacobian_of_lotka_volterra_matches_analytic() {
        let system = LotkaVolterra;
        let params = [1.5, 1.0, 3.0, 1.0];
        let y = [10.0, 5.0];
        let mut jac = vec![0.0; 4];
        jacobian(&system, 0.0, &y, &params, &mut jac).expect("jacobian should evaluate");

        assert!(close(jac[0], 1.5 - 5.0));
        assert!(close(jac[1], -10.0));
        assert!(close(jac[2], 5.0));
        assert!(close(jac[3], -3.0 + 10.0));
    }

    #[test]
    fn jacobian_rejects_wrong_buffer_size() {
        let mut jac = vec![0.0; 3];
        let err = jacobian(&LotkaVolterra, 0.0, &[1.0, 1.0], &[1.0; 4], &mut jac)
            .expect_err("expected error");
        assert!(format!("{err}").contains("Jacobian buffer"));
    }
}
