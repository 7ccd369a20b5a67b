//! Error taxonomy for the core.
//!
//! Plain enums with hand-written `Display`/`Error` impls rather than
//! pulling in an error-derive crate: the set of variants is small and
//! fixed.

use std::error::Error as StdError;
use std::fmt;

/// Errors raised by `BigInt` arithmetic and conversions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArithmeticError {
    /// A literal or encoded buffer exceeds the native bit-vector width.
    Overflow,
    /// Division or modulo by zero.
    DivideByZero,
    /// An invalid floating-point operation (infinite, NaN-producing).
    InvalidFloatOp,
    /// `SEG`, `WRT` or `SEGOFF` applied to a plain integer.
    NonNumericOp,
}

impl fmt::Display for ArithmeticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ArithmeticError::Overflow => "numeric constant too large for internal format",
            ArithmeticError::DivideByZero => "divide by zero",
            ArithmeticError::InvalidFloatOp => "invalid floating point operation",
            ArithmeticError::NonNumericOp => "invalid use of a non-numeric operator",
        };
        f.write_str(msg)
    }
}

impl StdError for ArithmeticError {}

/// Errors raised when an `Expr` cannot be reduced to the shape a `Value`
/// needs, or when a context requires a purely absolute/constant result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueError {
    /// The expression cannot be expressed as a single relocation
    /// (two relative symbols, `WRT` of an integer, `SEG` of a non-symbol...).
    TooComplex,
    /// A relative reference appeared where only an absolute value is valid.
    NotAbsolute,
    /// The expression is not a compile-time constant.
    NotConstant,
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ValueError::TooComplex => "expression too complex to fit requested value type",
            ValueError::NotAbsolute => "expression must be section-relative",
            ValueError::NotConstant => "expression is not constant",
        };
        f.write_str(msg)
    }
}

impl StdError for ValueError {}

/// Errors raised while resolving symbol references.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReferenceError {
    /// `expand_equ` found a cycle among EQU definitions.
    CircularEqu,
    /// `Expr::substitute` was given fewer terms than a `subst` leaf needs.
    SubstIndexOutOfRange,
}

impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ReferenceError::CircularEqu => "circular reference detected in EQU expansion",
            ReferenceError::SubstIndexOutOfRange => "subst term index out of range",
        };
        f.write_str(msg)
    }
}

impl StdError for ReferenceError {}
