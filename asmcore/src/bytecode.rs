//! Collaborator interface for the bytecode/section container.
//!
//! A `Bytecode` is, from the core's point of view, just something with an
//! eventual absolute offset that `Value`/`Location` arithmetic can refer to.
//! Building, optimizing and laying out the containing sections is the
//! front end's job; the core only appends to one and reads its offset back.

use crate::bigint::BigInt;
use crate::symbol::SectionId;
use crate::value::Value;

/// Non-owning handle to a bytecode, opaque outside the implementing
/// container.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BytecodeRef(pub u32);

/// Services the core needs from whatever owns bytecodes and sections.
pub trait BytecodeSink {
    /// Append raw bytes, unconditionally.
    fn append_bytes(&mut self, bc: BytecodeRef, bytes: &[u8]);

    /// Append a numeric field of `size` bits; delegates back to
    /// [`crate::value::Value::output_basic`] once the field's absolute
    /// offset is known and either writes the bytes or records a relocation.
    fn append_value(&mut self, bc: BytecodeRef, value: Value, size: u32);

    /// Append `value` LEB128-encoded.
    fn append_leb128(&mut self, bc: BytecodeRef, value: &BigInt, signed: bool);

    /// Append alignment padding up to `boundary` bytes, using `fill` (or
    /// [`crate::arch::Architecture::default_nop_fill`] if `None`).
    fn append_align(&mut self, bc: BytecodeRef, boundary: u32, fill: Option<u8>);

    /// The absolute byte offset assigned to `bc` by the optimizer, if any
    /// has been assigned yet.
    fn offset(&self, bc: BytecodeRef) -> Option<u64>;

    /// The section `bc` is contained in, used by
    /// [`crate::value::Value::output_basic`] to check whether a
    /// PC-relative relocation is local enough to fold into a constant.
    fn section_of(&self, bc: BytecodeRef) -> Option<SectionId>;

    /// True if `a` and `b` are the same bytecode.
    fn same_bytecode(&self, a: BytecodeRef, b: BytecodeRef) -> bool {
        a == b
    }
}
