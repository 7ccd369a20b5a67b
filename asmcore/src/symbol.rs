//! Collaborator interface for the symbol table.
//!
//! Symbols are opaque to the core: it only ever holds a non-owning
//! [`SymbolId`] and asks the table questions it needs to finalize a `Value`
//! (does this symbol have an EQU expression, what section is it in, is that
//! section absolute). Creating, naming, and scoping symbols is entirely the
//! front end's responsibility.

use crate::expr::Expr;

/// Non-owning handle to a symbol, opaque outside the implementing table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SymbolId(pub u32);

/// Non-owning handle to a section, used only to compare "same section" vs
/// "different section" when folding symbol differences.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SectionId(pub u32);

/// Services the core needs from whatever owns the symbol table.
pub trait SymbolTable {
    /// Look up a symbol by name.
    fn lookup(&self, name: &str) -> Option<SymbolId>;

    /// Create a fresh, unnamed symbol — used internally to label the two
    /// ends of a distance computation when no user symbol exists there.
    fn create_anonymous(&mut self) -> SymbolId;

    /// The EQU expression bound to this symbol, if any.
    fn equ(&self, id: SymbolId) -> Option<&Expr>;

    /// The section a symbol is defined in, if it is defined at all.
    fn section_of(&self, id: SymbolId) -> Option<SectionId>;

    /// If `section` is an absolute section (one fixed at a known address
    /// rather than relocated), its start address.
    fn absolute_section_start(&self, section: SectionId) -> Option<crate::bigint::BigInt>;

    /// The byte offset of a symbol within its section, if known.
    fn offset_in_section(&self, id: SymbolId) -> Option<crate::bigint::BigInt>;
}
