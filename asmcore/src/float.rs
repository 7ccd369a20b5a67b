//! Floating-point constants.
//!
//! Nothing in this workspace's dependency stack pulls in a bignum-float
//! crate, so this is deliberately an `f64` substitute: it carries the same
//! `calc`/error surface as [`BigInt`] so callers that only need "a numeric
//! leaf with checked arithmetic" don't care which one backs a given
//! [`crate::expr::Term`].

use std::fmt;

use crate::error::ArithmeticError;
use crate::operator::Operator;

/// A floating-point constant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Float(f64);

/// IEEE-754-style exception flags raised by a single [`Float::calc_checked`]
/// call, surfaced by the caller as diagnostics rather than by panicking or
/// failing the operation outright (`overflow`/`underflow`/`inexact` are
/// warnings in spec terms; only `invalid_op`/`div_by_zero` are errors, and
/// those are returned as `Err` instead).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FloatFlags {
    pub overflow: bool,
    pub underflow: bool,
    pub inexact: bool,
}

/// Dekker's two-sum: true iff `a + b` (already rounded to `sum`) lost no
/// bits, i.e. `sum` is the exact mathematical sum.
fn add_is_exact(a: f64, b: f64, sum: f64) -> bool {
    let bb = sum - a;
    let aa = sum - bb;
    let da = a - aa;
    let db = b - bb;
    (da + db) == 0.0
}

/// Same idea via an FMA residual: true iff `a * b` (already rounded to
/// `prod`) lost no bits.
fn mul_is_exact(a: f64, b: f64, prod: f64) -> bool {
    a.mul_add(b, -prod) == 0.0
}

impl Float {
    pub fn from_f64(v: f64) -> Self {
        Float(v)
    }

    pub fn to_f64(self) -> f64 {
        self.0
    }

    pub fn zero() -> Self {
        Float(0.0)
    }

    /// Arithmetic mirroring [`crate::bigint::BigInt::calc`]'s surface
    /// (`NEG`/unary operators pass `operand = None`), discarding the
    /// exception flags [`Float::calc_checked`] tracks. Used where no
    /// diagnostics sink is reachable (e.g. `Expr::transform_neg`, which
    /// evaluates a literal `NEG` before any sink-aware pass runs).
    pub fn calc(&self, op: Operator, operand: Option<&Float>) -> Result<Float, ArithmeticError> {
        self.calc_checked(op, operand).map(|(v, _)| v)
    }

    /// Checked arithmetic: computes the result and, alongside it, which of
    /// `overflow`/`underflow`/`inexact` apply. Only `invalid_op` (NaN- or
    /// non-numeric-producing) and `div_by_zero` fail the operation outright;
    /// the rest are advisory, matching spec.md's float diagnostic kinds.
    pub fn calc_checked(
        &self,
        op: Operator,
        operand: Option<&Float>,
    ) -> Result<(Float, FloatFlags), ArithmeticError> {
        if op.is_non_numeric() {
            return Err(ArithmeticError::NonNumericOp);
        }
        let rhs = operand.map(|o| o.0).unwrap_or(0.0);
        let mut flags = FloatFlags::default();
        let result = match op {
            Operator::Add => {
                let sum = self.0 + rhs;
                flags.inexact = !add_is_exact(self.0, rhs, sum);
                sum
            }
            Operator::Sub => {
                let diff = self.0 - rhs;
                flags.inexact = !add_is_exact(self.0, -rhs, diff);
                diff
            }
            Operator::Mul => {
                let prod = self.0 * rhs;
                flags.inexact = !mul_is_exact(self.0, rhs, prod);
                if prod == 0.0 && self.0 != 0.0 && rhs != 0.0 {
                    flags.underflow = true;
                }
                prod
            }
            Operator::Div | Operator::SignDiv => {
                if rhs == 0.0 {
                    return Err(ArithmeticError::DivideByZero);
                }
                let quot = self.0 / rhs;
                flags.inexact = quot.mul_add(rhs, -self.0) != 0.0;
                if quot == 0.0 && self.0 != 0.0 {
                    flags.underflow = true;
                }
                quot
            }
            Operator::Mod | Operator::SignMod => {
                if rhs == 0.0 {
                    return Err(ArithmeticError::DivideByZero);
                }
                // IEEE remainder is always exactly representable given
                // exact inputs; no inexact flag applies here.
                self.0 % rhs
            }
            Operator::Neg => -self.0,
            Operator::Eq => return Ok((Float((self.0 == rhs) as i64 as f64), flags)),
            Operator::Lt => return Ok((Float((self.0 < rhs) as i64 as f64), flags)),
            Operator::Gt => return Ok((Float((self.0 > rhs) as i64 as f64), flags)),
            Operator::Le => return Ok((Float((self.0 <= rhs) as i64 as f64), flags)),
            Operator::Ge => return Ok((Float((self.0 >= rhs) as i64 as f64), flags)),
            Operator::Ne => return Ok((Float((self.0 != rhs) as i64 as f64), flags)),
            Operator::Ident => self.0,
            _ => return Err(ArithmeticError::InvalidFloatOp),
        };
        if result.is_nan() {
            return Err(ArithmeticError::InvalidFloatOp);
        }
        if result.is_infinite() && !self.0.is_infinite() && !rhs.is_infinite() {
            flags.overflow = true;
        }
        if result != 0.0 && result.is_finite() && result.abs() < f64::MIN_POSITIVE {
            flags.underflow = true;
        }
        Ok((Float(result), flags))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

impl fmt::Display for Float {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_arithmetic() {
        let a = Float::from_f64(3.5);
        let b = Float::from_f64(2.0);
        assert_eq!(a.calc(Operator::Add, Some(&b)).unwrap().to_f64(), 5.5);
        assert_eq!(a.calc(Operator::Mul, Some(&b)).unwrap().to_f64(), 7.0);
    }

    #[test]
    fn divide_by_zero_errors() {
        let a = Float::from_f64(1.0);
        let z = Float::zero();
        assert_eq!(
            a.calc(Operator::Div, Some(&z)).unwrap_err(),
            ArithmeticError::DivideByZero
        );
    }

    #[test]
    fn overflow_on_finite_inputs_producing_infinity() {
        let huge = Float::from_f64(f64::MAX);
        assert_eq!(
            huge.calc(Operator::Add, Some(&huge)).unwrap_err(),
            ArithmeticError::Overflow
        );
    }

    #[test]
    fn non_numeric_operator_rejected() {
        let a = Float::from_f64(1.0);
        assert_eq!(
            a.calc(Operator::Seg, None).unwrap_err(),
            ArithmeticError::NonNumericOp
        );
    }
}
