//! Relocatable values: the bridge from expressions to emittable,
//! potentially relocated bytes.

use crate::arch::{Architecture, Endianness};
use crate::bigint::{BigInt, RangeType};
use crate::bytecode::{BytecodeRef, BytecodeSink};
use crate::diag::{Diagnostic, DiagnosticKind, DiagnosticSink, SourceRange};
use crate::error::ValueError;
use crate::expr::{Expr, Leaf, LeafKind};
use crate::location::Location;
use crate::operator::Operator;
use crate::symbol::{SymbolId, SymbolTable};

/// Cap on `Value::rshift`.
pub const RSHIFT_MAX: u32 = 127;

/// The subtrahend of a `rel - sub` relocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Subtrahend {
    Symbol(SymbolId),
    Location(Location),
}

/// An emittable quantity of a specific bit width.
#[derive(Clone, Debug)]
pub struct Value {
    pub size: u32,
    pub abs: Option<Expr>,
    pub rel: Option<SymbolId>,
    pub wrt: Option<SymbolId>,
    pub sub: Option<Subtrahend>,
    pub seg_of: bool,
    pub rshift: u32,
    pub ip_rel: bool,
    pub curpos_rel: bool,
    pub jump_target: bool,
    pub section_rel: bool,
    pub sign: bool,
    pub warn_enabled: bool,
    pub no_warn: bool,
    pub next_insn: u32,
    pub source: SourceRange,
}

/// Outcome of [`Value::output_basic`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputOutcome {
    Written,
    NeedsRelocation,
}

impl Value {
    pub fn new(size: u32, abs: Expr, source: SourceRange) -> Self {
        Value {
            size,
            abs: Some(abs),
            rel: None,
            wrt: None,
            sub: None,
            seg_of: false,
            rshift: 0,
            ip_rel: false,
            curpos_rel: false,
            jump_target: false,
            section_rel: false,
            sign: false,
            warn_enabled: true,
            no_warn: false,
            next_insn: 0,
            source,
        }
    }

    /// Appends additive terms to `abs`, wrapping in `ADD` if `abs` is
    /// already non-trivial.
    pub fn add_abs(&mut self, term: Expr) {
        match self.abs.take() {
            None => self.abs = Some(term),
            Some(existing) => {
                let mut rebuilt = Expr::new();
                rebuilt.rebuild_from_children(Operator::Add, vec![existing, term]);
                self.abs = Some(rebuilt);
            }
        }
    }

    /// Normalizes a parsed expression into relocation shape: simplifies it,
    /// then scans the top-level additive terms for a distance pair or a
    /// single relative symbol, binding whatever is found into `rel`/`sub`/
    /// `wrt`/`seg_of`/`rshift` and leaving the remainder in `abs`.
    pub fn finalize(
        &mut self,
        symtab: &dyn SymbolTable,
        diag: &mut dyn DiagnosticSink,
    ) -> Result<(), ValueError> {
        let mut expr = match self.abs.take() {
            Some(e) => e,
            None => return Ok(()),
        };

        expr.expand_equ(symtab).map_err(|_| ValueError::TooComplex)?;
        expr.inline_absolute_symbols(symtab);
        expr.simplify(diag);

        let mut children = match expr.root_op_children() {
            Some((Operator::Add, children)) => children,
            // A non-ADD root with relative content is treated as a
            // single-term sum for the scan below.
            Some(_) | None => vec![expr.clone()],
        };

        self.extract_distance_pair(&mut children, symtab);
        self.extract_single_relative(&mut children, symtab)?;
        self.reject_stray_relatives(&children)?;

        let mut rebuilt = Expr::new();
        rebuilt.rebuild_from_children(Operator::Add, children);
        self.abs = Some(rebuilt);
        Ok(())
    }

    /// Looks for `symA + (-1)*symB` among `children` and either folds it
    /// to a numeric distance (same section) or binds `rel`/`sub`
    /// (cross-section).
    fn extract_distance_pair(&mut self, children: &mut Vec<Expr>, symtab: &dyn SymbolTable) {
        let mut plus_idx = None;
        let mut minus_idx = None;
        for (i, c) in children.iter().enumerate() {
            if as_bare_symbol(c).is_some() && plus_idx.is_none() {
                plus_idx = Some(i);
            } else if as_negated_symbol(c).is_some() && minus_idx.is_none() {
                minus_idx = Some(i);
            }
        }
        let (Some(pi), Some(mi)) = (plus_idx, minus_idx) else {
            return;
        };
        if pi == mi {
            return;
        }
        let sym_a = as_bare_symbol(&children[pi]).unwrap();
        let sym_b = as_negated_symbol(&children[mi]).unwrap();

        let same_section = matches!(
            (symtab.section_of(sym_a), symtab.section_of(sym_b)),
            (Some(sa), Some(sb)) if sa == sb
        );

        if same_section {
            if let (Some(off_a), Some(off_b)) = (
                symtab.offset_in_section(sym_a),
                symtab.offset_in_section(sym_b),
            ) {
                if let Ok(dist) = off_a.calc(Operator::Sub, Some(&off_b)) {
                    let (lo, hi) = (pi.min(mi), pi.max(mi));
                    children.remove(hi);
                    children.remove(lo);
                    children.push(Expr::from_int(dist));
                    return;
                }
            }
        }

        self.rel = Some(sym_a);
        self.sub = Some(Subtrahend::Symbol(sym_b));
        let (lo, hi) = (pi.min(mi), pi.max(mi));
        children.remove(hi);
        children.remove(lo);
    }

    /// Finds the at-most-one remaining relative term (bare symbol,
    /// `SEG sym`, `sym >> const`, `sym WRT base`, or a `SEGOFF` pair) and
    /// binds it into `rel`/`seg_of`/`rshift`/`wrt`, folding any `SEGOFF`
    /// offset half back into the absolute remainder.
    fn extract_single_relative(
        &mut self,
        children: &mut Vec<Expr>,
        symtab: &dyn SymbolTable,
    ) -> Result<(), ValueError> {
        let _ = symtab;
        let mut found_at = None;
        let mut extra_abs = None;
        for (i, c) in children.iter().enumerate() {
            match classify_relative(c, self.size)? {
                Some(RelativeShape::None) | None => {}
                Some(shape) => {
                    if found_at.is_some() || self.rel.is_some() {
                        return Err(ValueError::TooComplex);
                    }
                    found_at = Some(i);
                    match shape {
                        RelativeShape::Bare(sym) => {
                            self.rel = Some(sym);
                        }
                        RelativeShape::Masked(sym) => {
                            self.rel = Some(sym);
                            self.warn_enabled = false;
                        }
                        RelativeShape::SegOf(sym) => {
                            self.rel = Some(sym);
                            self.seg_of = true;
                        }
                        RelativeShape::Rshift(sym, n) => {
                            self.rel = Some(sym);
                            self.rshift = n.min(RSHIFT_MAX);
                        }
                        RelativeShape::Wrt(sym, base) => {
                            self.rel = Some(sym);
                            self.wrt = Some(base);
                        }
                        RelativeShape::SegOff(sym, off_expr) => {
                            self.rel = Some(sym);
                            self.seg_of = true;
                            extra_abs = Some(off_expr);
                        }
                        RelativeShape::None => unreachable!(),
                    }
                }
            }
        }
        if let Some(i) = found_at {
            children.remove(i);
        }
        if let Some(off) = extra_abs {
            children.push(off);
        }
        Ok(())
    }

    /// Any symbol left in `children` at this point is relative but
    /// appeared under an operator finalize doesn't understand.
    fn reject_stray_relatives(&self, children: &[Expr]) -> Result<(), ValueError> {
        if children.iter().any(|c| c.contains_anywhere(LeafKind::Symbol)) {
            return Err(ValueError::TooComplex);
        }
        Ok(())
    }

    /// The PC-relative bias to add to `abs` when folding `rel` into a
    /// constant: `rel`'s offset within its section, minus the address of
    /// the next instruction (`bc_offset + at_offset + next_insn`).
    fn calc_pcrel_sub(&self, bc_offset: u64, at_offset: u64, rel_offset: &BigInt) -> Option<BigInt> {
        let curpos = BigInt::from(bc_offset as i64)
            .calc(Operator::Add, Some(&BigInt::from(at_offset as i64)))
            .ok()?
            .calc(Operator::Add, Some(&BigInt::from(self.next_insn as i64)))
            .ok()?;
        rel_offset.calc(Operator::Sub, Some(&curpos)).ok()
    }

    /// Per `libyasm`'s documented contract: "adds in value.rel (correctly)
    /// if PC-relative and in the same section as bc (and there is no WRT
    /// or SEG)". Returns the bias to fold into `abs`, or `None` if `rel`
    /// can't be folded (not IP-relative, has a WRT/SEG/sub, or resolves to
    /// a different or unknown section) and a relocation is needed instead.
    fn fold_same_section_pcrel(
        &self,
        rel: SymbolId,
        at: Location,
        bc: &dyn BytecodeSink,
        symtab: &dyn SymbolTable,
    ) -> Option<BigInt> {
        if !self.ip_rel || self.sub.is_some() || self.wrt.is_some() || self.seg_of {
            return None;
        }
        let bc_section = bc.section_of(at.bytecode)?;
        let rel_section = symtab.section_of(rel)?;
        if bc_section != rel_section {
            return None;
        }
        let bc_offset = bc.offset(at.bytecode)?;
        let rel_offset = symtab.offset_in_section(rel)?;
        self.calc_pcrel_sub(bc_offset, at.offset, &rel_offset)
    }

    /// Converts `self` into the subtrahend side of a PC-relative
    /// relocation anchored at `loc`.
    ///
    /// If `self` has no relative part yet, this Value is really a bare
    /// absolute quantity that still needs to act as the minuend of a
    /// distance relocation — `symtab` mints an anonymous symbol standing
    /// for "here" and that becomes `rel`, so the `rel - sub` shape is
    /// always populated on return.
    pub fn sub_relative(&mut self, symtab: &mut dyn SymbolTable, loc: Location) {
        let rel = self.rel.unwrap_or_else(|| symtab.create_anonymous());
        self.sub = Some(Subtrahend::Location(loc));
        self.rel = Some(rel);
    }

    /// Emits the bytes of this value at bytecode `at`.
    pub fn output_basic(
        &mut self,
        dest: &mut [u8],
        at: Location,
        arch: &dyn Architecture,
        bc: &dyn BytecodeSink,
        symtab: &dyn SymbolTable,
        diag: &mut dyn DiagnosticSink,
    ) -> Result<OutputOutcome, ValueError> {
        if let Some(rel) = self.rel {
            match self.fold_same_section_pcrel(rel, at, bc, symtab) {
                Some(bias) => {
                    self.add_abs(Expr::from_int(bias));
                    self.rel = None;
                }
                None => return Ok(OutputOutcome::NeedsRelocation),
            }
        }

        let value = match &self.abs {
            Some(e) => match e.as_int() {
                Some(n) => n.clone(),
                None => return Err(ValueError::NotConstant),
            },
            None => BigInt::zero(),
        };

        let warn_mode = if self.no_warn {
            0
        } else if self.sign {
            -1
        } else {
            1
        };
        let bigendian = matches!(arch.endianness(), Endianness::Big);
        // `get_sized`'s `shift` is a left-shift bit offset; a negative value
        // means "right-shift first", which is what `rshift` (always stored
        // non-negative) represents here.
        let (overflow, misaligned) =
            value.get_sized(dest, self.size, -(self.rshift as i32), bigendian, warn_mode);

        if self.warn_enabled {
            if overflow {
                let rangetype = if self.sign {
                    RangeType::Signed
                } else {
                    RangeType::Combined
                };
                let fits = value.ok_size(self.size, self.rshift, rangetype);
                diag.report(Diagnostic {
                    kind: if fits {
                        DiagnosticKind::WarnValueDoesNotFit
                    } else {
                        DiagnosticKind::WarnValueOverflow
                    },
                    source: self.source,
                    args: vec![],
                });
            }
            if misaligned {
                diag.report(Diagnostic {
                    kind: DiagnosticKind::WarnMisalignedValue,
                    source: self.source,
                    args: vec![],
                });
            }
        }

        Ok(OutputOutcome::Written)
    }
}

enum RelativeShape {
    None,
    Bare(SymbolId),
    /// A symbol ANDed with the full bitmask of the value's own size
    /// (`sym & 0xff` for an 8-bit value): relative, but with warnings
    /// suppressed since the mask already constrains it to fit.
    Masked(SymbolId),
    SegOf(SymbolId),
    Rshift(SymbolId, u32),
    Wrt(SymbolId, SymbolId),
    SegOff(SymbolId, Expr),
}

fn as_bare_symbol(e: &Expr) -> Option<SymbolId> {
    match e.root_leaf()? {
        Leaf::Symbol(s) => Some(*s),
        _ => None,
    }
}

/// Recognizes `MUL(-1, symbol)`.
fn as_negated_symbol(e: &Expr) -> Option<SymbolId> {
    let (op, children) = e.root_op_children()?;
    if op != Operator::Mul || children.len() != 2 {
        return None;
    }
    let is_neg1 = |c: &Expr| matches!(c.as_int(), Some(n) if n.is_neg1());
    if is_neg1(&children[0]) {
        as_bare_symbol(&children[1])
    } else if is_neg1(&children[1]) {
        as_bare_symbol(&children[0])
    } else {
        None
    }
}

fn classify_relative(e: &Expr, size: u32) -> Result<Option<RelativeShape>, ValueError> {
    if let Some(sym) = as_bare_symbol(e) {
        return Ok(Some(RelativeShape::Bare(sym)));
    }
    let Some((op, children)) = e.root_op_children() else {
        return Ok(None);
    };
    match op {
        Operator::And if children.len() == 2 => {
            let mask = BigInt::all_ones_mask(size);
            let is_full_mask = |c: &Expr| matches!(c.as_int(), Some(n) if *n == mask);
            let sym = as_bare_symbol(&children[0]).filter(|_| is_full_mask(&children[1]));
            let sym = sym.or_else(|| as_bare_symbol(&children[1]).filter(|_| is_full_mask(&children[0])));
            match sym {
                Some(sym) => Ok(Some(RelativeShape::Masked(sym))),
                None => Ok(None),
            }
        }
        Operator::Seg => {
            if children.len() == 1 {
                match as_bare_symbol(&children[0]) {
                    Some(sym) => Ok(Some(RelativeShape::SegOf(sym))),
                    None => Err(ValueError::TooComplex),
                }
            } else {
                Ok(None)
            }
        }
        Operator::Shr if children.len() == 2 => {
            let sym = as_bare_symbol(&children[0]);
            let amount = children[1].as_int();
            match (sym, amount) {
                (Some(sym), Some(n)) => {
                    let shift = n
                        .to_i64()
                        .filter(|&v| (0..=RSHIFT_MAX as i64).contains(&v))
                        .map(|v| v as u32)
                        .unwrap_or(RSHIFT_MAX);
                    Ok(Some(RelativeShape::Rshift(sym, shift)))
                }
                (Some(_), None) => Err(ValueError::TooComplex),
                _ => Ok(None),
            }
        }
        Operator::Wrt if children.len() == 2 => {
            let sym = as_bare_symbol(&children[0]);
            match sym {
                Some(sym) => match as_bare_symbol(&children[1]) {
                    Some(base) => Ok(Some(RelativeShape::Wrt(sym, base))),
                    None => Err(ValueError::TooComplex),
                },
                None => Ok(None),
            }
        }
        Operator::SegOff if children.len() == 2 => match as_bare_symbol(&children[0]) {
            Some(sym) => Ok(Some(RelativeShape::SegOff(sym, children[1].clone()))),
            None => Err(ValueError::TooComplex),
        },
        _ => Ok(None),
    }
}
