//! Assembler core: arbitrary-precision arithmetic, symbolic expression
//! trees, and relocatable values, as consumed by a parser front end and
//! an object-format writer.
//!
//! This crate does not parse assembly, drive instruction encoding, or emit
//! object files. It implements the semantic-value machinery sitting
//! between those two: [`bigint::BigInt`] for exact arithmetic,
//! [`expr::Expr`] for symbolic expression trees with algebraic
//! simplification, [`value::Value`] for the relocation-aware wrapper
//! emitted into a field of a given bit width, and [`location::Location`]
//! for label-distance arithmetic. Everything it needs from the rest of an
//! assembler — an architecture, a symbol table, a diagnostics sink, a
//! bytecode container — is expressed as a trait in [`arch`], [`symbol`],
//! [`diag`] and [`bytecode`] respectively; this crate never implements
//! any of them itself.

pub mod arch;
pub mod bigint;
pub mod bytecode;
pub mod diag;
pub mod error;
pub mod expr;
pub mod float;
pub mod location;
pub mod operator;
pub mod symbol;
pub mod value;

pub use bigint::BigInt;
pub use error::{ArithmeticError, ReferenceError, ValueError};
pub use expr::{Expr, Leaf, LeafKind};
pub use location::Location;
pub use operator::Operator;
pub use value::{OutputOutcome, Value};
