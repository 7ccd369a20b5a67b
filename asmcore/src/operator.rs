//! The closed set of expression operators and their classification.

/// An operator appearing in an `Expr` tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Operator {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    SignDiv,
    Mod,
    SignMod,
    Neg,
    // Bitwise
    Not,
    Or,
    And,
    Xor,
    Xnor,
    Nor,
    Shl,
    Shr,
    // Logical
    LOr,
    LAnd,
    LNot,
    LXor,
    LXnor,
    LNor,
    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    // Assembler-specific, non-numeric
    Seg,
    Wrt,
    SegOff,
    /// One-child passthrough, never retained after `Expr::append_op`
    /// collapses it away.
    Ident,
}

impl Operator {
    /// Operators that take exactly one child.
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Operator::Neg | Operator::Not | Operator::LNot | Operator::Seg
        )
    }

    /// Operators that may take more than two children and are leveled by
    /// `Expr::level_op`.
    pub fn is_associative(self) -> bool {
        matches!(
            self,
            Operator::Add
                | Operator::Mul
                | Operator::Or
                | Operator::And
                | Operator::Xor
                | Operator::LOr
                | Operator::LAnd
                | Operator::LXor
        )
    }

    /// Operators that are neither unary nor associative: they always take
    /// exactly two children.
    pub fn is_binary_only(self) -> bool {
        !self.is_unary() && !self.is_associative() && self != Operator::Ident
    }

    /// True for `Seg`/`Wrt`/`SegOff`: operators with assembler-specific,
    /// non-numeric meaning that `BigInt::calc` rejects.
    pub fn is_non_numeric(self) -> bool {
        matches!(self, Operator::Seg | Operator::Wrt | Operator::SegOff)
    }
}
