//! Collaborator interface for an architecture back-end.
//!
//! The core never encodes an instruction or owns a register table; it only
//! needs to carry opaque register/modifier handles through expressions and
//! ask an `Architecture` for the facts that affect field packing
//! (endianness, address size). A real front end implements this trait over
//! its own instruction-set back-end; nothing in this crate does.

/// Opaque handle to a register, assigned and interpreted by the
/// `Architecture` implementation. The core only stores and compares these.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RegisterId(pub u32);

/// Opaque handle to a target modifier (e.g. an `WRT`-style relocation
/// qualifier name understood by one architecture but not others).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TargetModifier(pub u32);

/// Byte order used when packing a `Value` into a destination buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Endianness {
    Little,
    Big,
}

/// The facts and services an `Architecture` back-end must provide for the
/// core to finalize and emit `Value`s. Everything else (parsing mnemonics,
/// encoding instructions) lives entirely on the implementor's side of this
/// boundary and the core never calls into it.
pub trait Architecture {
    /// Byte order of the target.
    fn endianness(&self) -> Endianness;

    /// Natural address size in bits (used as the default `Value` size for
    /// address-valued fields).
    fn address_size(&self) -> u32;

    /// Resolve a register by name, if this architecture has one with that
    /// spelling.
    fn lookup_register(&self, name: &str) -> Option<RegisterId>;

    /// Resolve a target modifier (`WRT` qualifier) by name.
    fn lookup_target_modifier(&self, name: &str) -> Option<TargetModifier>;

    /// The byte this architecture pads alignment gaps with when a
    /// `BytecodeSink::append_align` call supplies no explicit fill —
    /// e.g. a single-byte NOP opcode.
    fn default_nop_fill(&self) -> u8;
}
