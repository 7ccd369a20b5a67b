//! Cross-module scenarios exercising `Expr::simplify` and `Value::finalize`
//! together end to end.

use asmcore::arch::{Architecture, Endianness, RegisterId, TargetModifier};
use asmcore::bigint::BigInt;
use asmcore::bytecode::{BytecodeRef, BytecodeSink};
use asmcore::diag::{SourceRange, VecDiagnosticSink};
use asmcore::expr::{Expr, Leaf};
use asmcore::location::Location;
use asmcore::operator::Operator;
use asmcore::symbol::{SectionId, SymbolId, SymbolTable};
use asmcore::value::{OutputOutcome, Value};
use std::collections::HashMap;

fn leaf_int(e: &mut Expr, v: i64) {
    e.append_term(Leaf::Int(BigInt::from(v)), SourceRange::unknown());
}

fn leaf_sym(e: &mut Expr, id: u32) {
    e.append_term(Leaf::Symbol(SymbolId(id)), SourceRange::unknown());
}

fn simplified(mut e: Expr) -> (Expr, VecDiagnosticSink) {
    let mut diag = VecDiagnosticSink::new();
    e.simplify(&mut diag);
    (e, diag)
}

#[test]
fn nested_add_chain_levels_into_one_four_child_add() {
    // ADD(a, ADD(b, ADD(c, d)))
    let mut e = Expr::new();
    leaf_sym(&mut e, 1); // a
    leaf_sym(&mut e, 2); // b
    leaf_sym(&mut e, 3); // c
    leaf_sym(&mut e, 4); // d
    e.append_op(Operator::Add, 2, SourceRange::unknown()); // c + d
    e.append_op(Operator::Add, 2, SourceRange::unknown()); // b + (c + d)
    e.append_op(Operator::Add, 2, SourceRange::unknown()); // a + (b + (c + d))

    let (e, diag) = simplified(e);
    assert!(diag.diagnostics.is_empty());
    let (op, children) = e.root_op_children().expect("root is an operator");
    assert_eq!(op, Operator::Add);
    assert_eq!(children.len(), 4, "associative nesting must flatten to one level");
    let sym_at = |c: &Expr| match c.root_leaf() {
        Some(Leaf::Symbol(SymbolId(id))) => *id,
        other => panic!("expected symbol leaf, got {:?}", other),
    };
    assert_eq!(
        children.iter().map(sym_at).collect::<Vec<_>>(),
        vec![1, 2, 3, 4],
        "leveling must preserve left-to-right order"
    );
}

#[test]
fn nested_mul_by_one_and_constant_add_folds_to_fourteen() {
    // MUL(1, MUL(2, ADD(3, 4)))
    let mut e = Expr::new();
    leaf_int(&mut e, 3);
    leaf_int(&mut e, 4);
    e.append_op(Operator::Add, 2, SourceRange::unknown());
    leaf_int(&mut e, 2);
    e.append_op(Operator::Mul, 2, SourceRange::unknown());
    leaf_int(&mut e, 1);
    e.append_op(Operator::Mul, 2, SourceRange::unknown());

    let (e, diag) = simplified(e);
    assert!(diag.diagnostics.is_empty());
    assert_eq!(e.as_int(), Some(&BigInt::from(14)));
}

#[test]
fn mul_by_zero_absorbs_sibling_add_term() {
    // ADD(MUL(5, a, 0), 1) where `a` is a register.
    let mut e = Expr::new();
    leaf_int(&mut e, 5);
    e.append_term(Leaf::Register(RegisterId(0)), SourceRange::unknown());
    leaf_int(&mut e, 0);
    e.append_op(Operator::Mul, 3, SourceRange::unknown());
    leaf_int(&mut e, 1);
    e.append_op(Operator::Add, 2, SourceRange::unknown());

    let (e, diag) = simplified(e);
    assert!(diag.diagnostics.is_empty());
    assert_eq!(e.as_int(), Some(&BigInt::from(1)));
}

#[test]
fn seg_of_segoff_keeps_only_the_segment_half() {
    // SEG(SEGOFF(ADD(1, 2), 3))
    let mut e = Expr::new();
    leaf_int(&mut e, 1);
    leaf_int(&mut e, 2);
    e.append_op(Operator::Add, 2, SourceRange::unknown());
    leaf_int(&mut e, 3);
    e.append_op(Operator::SegOff, 2, SourceRange::unknown());
    e.append_op(Operator::Seg, 1, SourceRange::unknown());

    let (e, diag) = simplified(e);
    assert!(diag.diagnostics.is_empty());
    // The offset half (3) is discarded; the segment half (1 + 2) remains
    // and, since it's a pure constant, folds to 3.
    assert_eq!(e.as_int(), Some(&BigInt::from(3)));
}

struct EquSymtab {
    equs: HashMap<u32, Expr>,
}

impl SymbolTable for EquSymtab {
    fn lookup(&self, _name: &str) -> Option<SymbolId> {
        None
    }
    fn create_anonymous(&mut self) -> SymbolId {
        SymbolId(u32::MAX)
    }
    fn equ(&self, id: SymbolId) -> Option<&Expr> {
        self.equs.get(&id.0)
    }
    fn section_of(&self, _id: SymbolId) -> Option<SectionId> {
        None
    }
    fn absolute_section_start(&self, _section: SectionId) -> Option<BigInt> {
        None
    }
    fn offset_in_section(&self, _id: SymbolId) -> Option<BigInt> {
        None
    }
}

#[test]
fn circular_equ_chain_is_rejected() {
    // a := b + 1, b := 2 * c, c := a - 3
    let mut equs = HashMap::new();
    let mut a = Expr::new();
    leaf_sym(&mut a, 2); // b
    leaf_int(&mut a, 1);
    a.append_op(Operator::Add, 2, SourceRange::unknown());
    equs.insert(1, a);

    let mut b = Expr::new();
    leaf_int(&mut b, 2);
    leaf_sym(&mut b, 3); // c
    b.append_op(Operator::Mul, 2, SourceRange::unknown());
    equs.insert(2, b);

    let mut c = Expr::new();
    leaf_sym(&mut c, 1); // a
    leaf_int(&mut c, 3);
    c.append_op(Operator::Sub, 2, SourceRange::unknown());
    equs.insert(3, c);

    let symtab = EquSymtab { equs };
    let mut start = Expr::new();
    leaf_sym(&mut start, 1); // reference to `a`
    assert_eq!(
        start.expand_equ(&symtab).unwrap_err(),
        asmcore::error::ReferenceError::CircularEqu
    );
}

struct LittleEndianArch;
impl Architecture for LittleEndianArch {
    fn endianness(&self) -> Endianness {
        Endianness::Little
    }
    fn address_size(&self) -> u32 {
        32
    }
    fn lookup_register(&self, _name: &str) -> Option<RegisterId> {
        None
    }
    fn lookup_target_modifier(&self, _name: &str) -> Option<TargetModifier> {
        None
    }
    fn default_nop_fill(&self) -> u8 {
        0x90
    }
}

struct OffsetSink {
    offsets: HashMap<u32, u64>,
}
impl BytecodeSink for OffsetSink {
    fn append_bytes(&mut self, _bc: BytecodeRef, _bytes: &[u8]) {}
    fn append_value(&mut self, _bc: BytecodeRef, _value: Value, _size: u32) {}
    fn append_leb128(&mut self, _bc: BytecodeRef, _value: &BigInt, _signed: bool) {}
    fn append_align(&mut self, _bc: BytecodeRef, _boundary: u32, _fill: Option<u8>) {}
    fn offset(&self, bc: BytecodeRef) -> Option<u64> {
        self.offsets.get(&bc.0).copied()
    }
    fn section_of(&self, _bc: BytecodeRef) -> Option<SectionId> {
        None
    }
}

#[test]
fn value_finalize_then_output_basic_round_trips_a_plain_literal() {
    let symtab = EquSymtab {
        equs: HashMap::new(),
    };
    let mut v = Value::new(16, Expr::from_int(BigInt::from(0x1234)), SourceRange::unknown());
    let mut diag = VecDiagnosticSink::new();
    v.finalize(&symtab, &mut diag).unwrap();
    // finalize is idempotent.
    v.finalize(&symtab, &mut diag).unwrap();

    let sink = OffsetSink {
        offsets: HashMap::new(),
    };
    let mut dest = [0u8; 2];
    let outcome = v
        .output_basic(
            &mut dest,
            Location::new(BytecodeRef(0), 0),
            &LittleEndianArch,
            &sink,
            &symtab,
            &mut diag,
        )
        .unwrap();
    assert_eq!(outcome, OutputOutcome::Written);
    assert_eq!(dest, [0x34, 0x12]);
    assert!(diag.diagnostics.is_empty());
}

#[test]
fn value_with_cross_section_symbol_difference_needs_relocation() {
    struct Symtab {
        sections: HashMap<u32, u32>,
    }
    impl SymbolTable for Symtab {
        fn lookup(&self, _name: &str) -> Option<SymbolId> {
            None
        }
        fn create_anonymous(&mut self) -> SymbolId {
            SymbolId(u32::MAX)
        }
        fn equ(&self, _id: SymbolId) -> Option<&Expr> {
            None
        }
        fn section_of(&self, id: SymbolId) -> Option<SectionId> {
            self.sections.get(&id.0).map(|&s| SectionId(s))
        }
        fn absolute_section_start(&self, _section: SectionId) -> Option<BigInt> {
            None
        }
        fn offset_in_section(&self, _id: SymbolId) -> Option<BigInt> {
            None
        }
    }
    let mut sections = HashMap::new();
    sections.insert(1, 10);
    sections.insert(2, 20);
    let symtab = Symtab { sections };

    let mut e = Expr::new();
    leaf_sym(&mut e, 1);
    leaf_sym(&mut e, 2);
    e.append_op(Operator::Sub, 2, SourceRange::unknown());

    let mut v = Value::new(32, e, SourceRange::unknown());
    let mut diag = VecDiagnosticSink::new();
    v.finalize(&symtab, &mut diag).unwrap();
    assert_eq!(v.rel, Some(SymbolId(1)));

    let sink = OffsetSink {
        offsets: HashMap::new(),
    };
    let mut dest = [0u8; 4];
    let outcome = v
        .output_basic(
            &mut dest,
            Location::new(BytecodeRef(0), 0),
            &LittleEndianArch,
            &sink,
            &symtab,
            &mut diag,
        )
        .unwrap();
    assert_eq!(outcome, OutputOutcome::NeedsRelocation);
}
