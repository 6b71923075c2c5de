//! Complex numbers for orbit evaluation.
//!
//! `ComplexNumber` is the immutable value type used by the AST and the
//! interpreter. `MutableNumber` is its in-place counterpart, laid out as two
//! consecutive `f64`s so that generated native code can address it directly.
//!
//! Transcendental functions go through `libm` so that every backend and every
//! host computes bit-identical values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Immutable complex number.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ComplexNumber {
    pub re: f64,
    pub im: f64,
}

/// Canonical bit pattern for equality and hashing: `-0.0` folds into `0.0`.
#[inline]
fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

impl PartialEq for ComplexNumber {
    fn eq(&self, other: &Self) -> bool {
        canonical_bits(self.re) == canonical_bits(other.re)
            && canonical_bits(self.im) == canonical_bits(other.im)
    }
}

impl Eq for ComplexNumber {}

impl Hash for ComplexNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        canonical_bits(self.re).hash(state);
        canonical_bits(self.im).hash(state);
    }
}

impl fmt::Display for ComplexNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im < 0.0 {
            write!(f, "{}-{}i", self.re, -self.im)
        } else {
            write!(f, "{}+{}i", self.re, self.im)
        }
    }
}

impl ComplexNumber {
    pub const ZERO: ComplexNumber = ComplexNumber { re: 0.0, im: 0.0 };
    pub const ONE: ComplexNumber = ComplexNumber { re: 1.0, im: 0.0 };
    pub const I: ComplexNumber = ComplexNumber { re: 0.0, im: 1.0 };

    #[inline]
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    #[inline]
    pub const fn real(re: f64) -> Self {
        Self { re, im: 0.0 }
    }

    /// True iff the imaginary component is exactly zero.
    #[inline]
    pub fn is_real(&self) -> bool {
        self.im == 0.0
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }

    /// Magnitude `|z|`.
    #[inline]
    pub fn modulus(&self) -> f64 {
        libm::hypot(self.re, self.im)
    }

    /// Squared magnitude `|z|²`.
    #[inline]
    pub fn modulus_sq(&self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    /// Argument in `(-π, π]`.
    #[inline]
    pub fn phase(&self) -> f64 {
        libm::atan2(self.im, self.re)
    }

    #[inline]
    pub fn conj(&self) -> Self {
        Self::new(self.re, -self.im)
    }

    /// Component-wise absolute value.
    #[inline]
    pub fn abs(&self) -> Self {
        Self::new(self.re.abs(), self.im.abs())
    }

    #[inline]
    pub fn floor(&self) -> Self {
        Self::new(libm::floor(self.re), libm::floor(self.im))
    }

    #[inline]
    pub fn ceil(&self) -> Self {
        Self::new(libm::ceil(self.re), libm::ceil(self.im))
    }

    #[inline]
    pub fn square(&self) -> Self {
        Self::new(
            self.re * self.re - self.im * self.im,
            2.0 * self.re * self.im,
        )
    }

    #[inline]
    pub fn reciprocal(&self) -> Self {
        Self::ONE / *self
    }

    pub fn exp(&self) -> Self {
        let e = libm::exp(self.re);
        Self::new(e * libm::cos(self.im), e * libm::sin(self.im))
    }

    /// Principal branch of the natural logarithm.
    pub fn log(&self) -> Self {
        Self::new(libm::log(self.modulus()), self.phase())
    }

    /// Principal square root.
    pub fn sqrt(&self) -> Self {
        let r = self.modulus();
        let re = libm::sqrt((r + self.re) * 0.5);
        let im = libm::sqrt((r - self.re) * 0.5);
        Self::new(re, libm::copysign(im, self.im))
    }

    pub fn sin(&self) -> Self {
        Self::new(
            libm::sin(self.re) * libm::cosh(self.im),
            libm::cos(self.re) * libm::sinh(self.im),
        )
    }

    pub fn cos(&self) -> Self {
        Self::new(
            libm::cos(self.re) * libm::cosh(self.im),
            -(libm::sin(self.re) * libm::sinh(self.im)),
        )
    }

    pub fn tan(&self) -> Self {
        self.sin() / self.cos()
    }

    pub fn sinh(&self) -> Self {
        Self::new(
            libm::sinh(self.re) * libm::cos(self.im),
            libm::cosh(self.re) * libm::sin(self.im),
        )
    }

    pub fn cosh(&self) -> Self {
        Self::new(
            libm::cosh(self.re) * libm::cos(self.im),
            libm::sinh(self.re) * libm::sin(self.im),
        )
    }

    pub fn tanh(&self) -> Self {
        self.sinh() / self.cosh()
    }

    /// `asin(z) = -i·log(iz + sqrt(1 - z²))`
    pub fn asin(&self) -> Self {
        let iz = Self::I * *self;
        let root = (Self::ONE - self.square()).sqrt();
        -(Self::I * (iz + root).log())
    }

    /// `acos(z) = -i·log(z + i·sqrt(1 - z²))`
    pub fn acos(&self) -> Self {
        let root = (Self::ONE - self.square()).sqrt();
        -(Self::I * (*self + Self::I * root).log())
    }

    /// `atan(z) = (i/2)·(log(1 - iz) - log(1 + iz))`
    pub fn atan(&self) -> Self {
        let iz = Self::I * *self;
        let half_i = Self::new(0.0, 0.5);
        half_i * ((Self::ONE - iz).log() - (Self::ONE + iz).log())
    }

    /// `z^w` on the principal branch; `0^w` is `1` for `w = 0` and `0` otherwise.
    pub fn pow(&self, exponent: ComplexNumber) -> Self {
        if exponent.is_real() {
            return self.pow_real(exponent.re);
        }
        if self.re == 0.0 && self.im == 0.0 {
            return Self::ZERO;
        }
        (exponent * self.log()).exp()
    }

    /// `z^k` for a real exponent. Small integer exponents use repeated
    /// multiplication so that `z^2` and `z*z` agree exactly.
    pub fn pow_real(&self, exponent: f64) -> Self {
        if exponent == libm::trunc(exponent) && exponent.abs() <= 64.0 {
            let mut k = exponent.abs() as u32;
            let mut base = *self;
            let mut result = Self::ONE;
            while k > 0 {
                if k & 1 == 1 {
                    result = result * base;
                }
                k >>= 1;
                if k > 0 {
                    base = base * base;
                }
            }
            return if exponent < 0.0 {
                result.reciprocal()
            } else {
                result
            };
        }
        if self.re == 0.0 && self.im == 0.0 {
            return if exponent == 0.0 { Self::ONE } else { Self::ZERO };
        }
        let r = libm::pow(self.modulus(), exponent);
        let theta = self.phase() * exponent;
        Self::new(r * libm::cos(theta), r * libm::sin(theta))
    }
}

impl Add for ComplexNumber {
    type Output = ComplexNumber;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for ComplexNumber {
    type Output = ComplexNumber;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for ComplexNumber {
    type Output = ComplexNumber;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl Div for ComplexNumber {
    type Output = ComplexNumber;

    #[inline]
    fn div(self, rhs: Self) -> Self {
        let d = rhs.re * rhs.re + rhs.im * rhs.im;
        Self::new(
            (self.re * rhs.re + self.im * rhs.im) / d,
            (self.im * rhs.re - self.re * rhs.im) / d,
        )
    }
}

impl Neg for ComplexNumber {
    type Output = ComplexNumber;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.re, -self.im)
    }
}

impl Mul<f64> for ComplexNumber {
    type Output = ComplexNumber;

    #[inline]
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.re * rhs, self.im * rhs)
    }
}

impl Add<f64> for ComplexNumber {
    type Output = ComplexNumber;

    #[inline]
    fn add(self, rhs: f64) -> Self {
        Self::new(self.re + rhs, self.im)
    }
}

impl From<f64> for ComplexNumber {
    fn from(re: f64) -> Self {
        Self::real(re)
    }
}

impl From<(f64, f64)> for ComplexNumber {
    fn from((re, im): (f64, f64)) -> Self {
        Self::new(re, im)
    }
}

/// Mutable complex register.
///
/// Used for the fixed pool of numeric slots each program instance owns. The
/// `repr(C)` layout (`re` then `im`) is relied on by the native backend.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MutableNumber {
    pub re: f64,
    pub im: f64,
}

impl MutableNumber {
    #[inline]
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    #[inline]
    pub fn set(&mut self, value: ComplexNumber) -> &mut Self {
        self.re = value.re;
        self.im = value.im;
        self
    }

    #[inline]
    pub fn set_real(&mut self, re: f64) -> &mut Self {
        self.re = re;
        self.im = 0.0;
        self
    }

    #[inline]
    pub fn clear(&mut self) -> &mut Self {
        self.re = 0.0;
        self.im = 0.0;
        self
    }

    #[inline]
    pub fn get(&self) -> ComplexNumber {
        ComplexNumber::new(self.re, self.im)
    }

    #[inline]
    pub fn add_assign(&mut self, value: ComplexNumber) -> &mut Self {
        self.re += value.re;
        self.im += value.im;
        self
    }

    #[inline]
    pub fn sub_assign(&mut self, value: ComplexNumber) -> &mut Self {
        self.re -= value.re;
        self.im -= value.im;
        self
    }

    #[inline]
    pub fn mul_assign(&mut self, value: ComplexNumber) -> &mut Self {
        let re = self.re * value.re - self.im * value.im;
        let im = self.re * value.im + self.im * value.re;
        self.re = re;
        self.im = im;
        self
    }

    #[inline]
    pub fn div_assign(&mut self, value: ComplexNumber) -> &mut Self {
        let quotient = self.get() / value;
        self.set(quotient)
    }

    #[inline]
    pub fn square_in_place(&mut self) -> &mut Self {
        let re = self.re * self.re - self.im * self.im;
        let im = 2.0 * self.re * self.im;
        self.re = re;
        self.im = im;
        self
    }

    #[inline]
    pub fn modulus_sq(&self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    #[inline]
    pub fn is_real(&self) -> bool {
        self.im == 0.0
    }
}

impl From<ComplexNumber> for MutableNumber {
    fn from(value: ComplexNumber) -> Self {
        Self::new(value.re, value.im)
    }
}

impl From<MutableNumber> for ComplexNumber {
    fn from(value: MutableNumber) -> Self {
        value.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const EPS: f64 = 1e-12;

    fn close(a: ComplexNumber, b: ComplexNumber) -> bool {
        (a.re - b.re).abs() < EPS && (a.im - b.im).abs() < EPS
    }

    #[test]
    fn is_real_only_for_exact_zero_imaginary() {
        assert!(ComplexNumber::new(3.0, 0.0).is_real());
        assert!(ComplexNumber::new(3.0, -0.0).is_real());
        assert!(!ComplexNumber::new(3.0, 1e-300).is_real());
    }

    #[test]
    fn equality_and_hash_by_component_value() {
        let mut set = HashSet::new();
        set.insert(ComplexNumber::new(1.0, 2.0));
        set.insert(ComplexNumber::new(1.0, 2.0));
        set.insert(ComplexNumber::new(0.0, -0.0));
        set.insert(ComplexNumber::new(-0.0, 0.0));
        assert_eq!(set.len(), 2);
        assert_ne!(ComplexNumber::new(1.0, 2.0), ComplexNumber::new(2.0, 1.0));
    }

    #[test]
    fn arithmetic_matches_textbook_formulas() {
        let a = ComplexNumber::new(1.0, 2.0);
        let b = ComplexNumber::new(3.0, -1.0);
        assert_eq!(a + b, ComplexNumber::new(4.0, 1.0));
        assert_eq!(a - b, ComplexNumber::new(-2.0, 3.0));
        assert_eq!(a * b, ComplexNumber::new(5.0, 5.0));
        assert!(close((a * b) / b, a));
        assert_eq!(-a, ComplexNumber::new(-1.0, -2.0));
    }

    #[test]
    fn square_equals_self_multiplication() {
        let z = ComplexNumber::new(0.3, -1.7);
        assert_eq!(z.square(), z * z);
        assert_eq!(z.pow_real(2.0), z * z);
    }

    #[test]
    fn exp_log_are_inverse() {
        let z = ComplexNumber::new(0.5, 1.25);
        assert!(close(z.log().exp(), z));
        assert!(close(z.exp().log(), z));
    }

    #[test]
    fn sqrt_is_principal_root() {
        let root = ComplexNumber::new(-4.0, 0.0).sqrt();
        assert!(close(root, ComplexNumber::new(0.0, 2.0)));
        let z = ComplexNumber::new(-3.0, -4.0);
        assert!(close(z.sqrt() * z.sqrt(), z));
        assert!(z.sqrt().im < 0.0);
    }

    #[test]
    fn trigonometric_identities_hold() {
        let z = ComplexNumber::new(0.7, -0.4);
        let s = z.sin();
        let c = z.cos();
        assert!(close(s * s + c * c, ComplexNumber::ONE));
        assert!(close(z.asin().sin(), z));
        assert!(close(z.acos().cos(), z));
        assert!(close(z.atan().tan(), z));
        assert!(close(z.tanh(), z.sinh() / z.cosh()));
    }

    #[test]
    fn pow_handles_zero_and_fractional_exponents() {
        assert_eq!(ComplexNumber::ZERO.pow_real(0.0), ComplexNumber::ONE);
        assert_eq!(ComplexNumber::ZERO.pow_real(2.5), ComplexNumber::ZERO);
        let z = ComplexNumber::new(2.0, 0.0);
        assert!(close(z.pow_real(0.5), ComplexNumber::new(2f64.sqrt(), 0.0)));
        let w = ComplexNumber::new(1.0, 1.0);
        assert!(close(w.pow_real(-1.0), w.reciprocal()));
        assert!(close(w.pow(ComplexNumber::new(0.0, 1.0)), (ComplexNumber::I * w.log()).exp()));
    }

    #[test]
    fn mutable_number_updates_in_place() {
        let mut m = MutableNumber::new(1.0, 1.0);
        m.square_in_place();
        assert_eq!(m.get(), ComplexNumber::new(0.0, 2.0));
        m.add_assign(ComplexNumber::new(1.0, 0.0))
            .mul_assign(ComplexNumber::I);
        assert_eq!(m.get(), ComplexNumber::new(-2.0, 1.0));
        m.clear();
        assert_eq!(m.get(), ComplexNumber::ZERO);
    }

    #[test]
    fn complex_number_serialization_roundtrip() {
        let z = ComplexNumber::new(-0.75, 0.1);
        let json = serde_json::to_string(&z).unwrap();
        let restored: ComplexNumber = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, z);
    }
}
