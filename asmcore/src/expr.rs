//! Symbolic expression trees.
//!
//! An `Expr` is a flattened, postfix-ordered ("Polish", read backwards)
//! sequence of terms, each tagged with a depth. An operator's children are
//! the contiguous run of non-empty terms immediately preceding it whose
//! depth is one greater than its own — this mirrors how the tree is built
//! (`append_term`/`append_op` in postfix order) and lets every mutation
//! (`simplify`, `substitute`, the `extract_*` family) work by slicing the
//! term vector rather than walking parent/child pointers.

use crate::arch::RegisterId;
use crate::bigint::BigInt;
use crate::diag::{Diagnostic, DiagnosticKind, DiagnosticSink, SourceRange};
use crate::error::{ArithmeticError, ReferenceError};
use crate::float::Float;
use crate::location::Location;
use crate::operator::Operator;
use crate::symbol::{SymbolId, SymbolTable};

/// A leaf value at the bottom of an expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Leaf {
    Int(BigInt),
    Float(Float),
    Register(RegisterId),
    Symbol(SymbolId),
    Location(Location),
    /// Placeholder filled in by [`Expr::substitute`].
    Subst(usize),
}

/// Discriminant used by [`Expr::contains`] without needing a leaf value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LeafKind {
    Int,
    Float,
    Register,
    Symbol,
    Location,
    Subst,
}

impl Leaf {
    fn kind(&self) -> LeafKind {
        match self {
            Leaf::Int(_) => LeafKind::Int,
            Leaf::Float(_) => LeafKind::Float,
            Leaf::Register(_) => LeafKind::Register,
            Leaf::Symbol(_) => LeafKind::Symbol,
            Leaf::Location(_) => LeafKind::Location,
            Leaf::Subst(_) => LeafKind::Subst,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Term {
    Leaf(Leaf),
    Op { op: Operator, nchild: usize },
    /// Sentinel left behind by in-place deletion during simplification;
    /// swept away at the end of `simplify`.
    Empty,
}

#[derive(Clone, Debug)]
struct Node {
    term: Term,
    depth: u32,
    source: SourceRange,
}

/// A symbolic expression tree, stored flat.
#[derive(Clone, Debug, Default)]
pub struct Expr {
    nodes: Vec<Node>,
}

impl Expr {
    pub fn new() -> Self {
        Expr { nodes: Vec::new() }
    }

    pub fn from_int(value: BigInt) -> Self {
        let mut e = Expr::new();
        e.append_term(Leaf::Int(value), SourceRange::unknown());
        e
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(|n| matches!(n.term, Term::Empty))
    }

    /// Index of the root term (the last non-empty term).
    fn root_index(&self) -> Option<usize> {
        self.nodes.iter().rposition(|n| !matches!(n.term, Term::Empty))
    }

    /// If the whole expression is a single integer constant, return it.
    pub fn as_int(&self) -> Option<&BigInt> {
        match self.root_index().map(|i| &self.nodes[i].term) {
            Some(Term::Leaf(Leaf::Int(n))) => Some(n),
            _ => None,
        }
    }

    /// If the whole expression is a single float constant, return it.
    pub fn as_float(&self) -> Option<Float> {
        match self.root_index().map(|i| &self.nodes[i].term) {
            Some(Term::Leaf(Leaf::Float(f))) => Some(*f),
            _ => None,
        }
    }

    /// The root leaf, if the whole expression is a single leaf.
    pub fn root_leaf(&self) -> Option<&Leaf> {
        match self.root_index().map(|i| &self.nodes[i].term) {
            Some(Term::Leaf(l)) => Some(l),
            _ => None,
        }
    }

    /// The root operator and its children, detached as standalone `Expr`s,
    /// if the root is an operator term. Used by `Value::finalize` to
    /// pattern-match the top-level shape of an absolute expression without
    /// reaching into `Expr`'s flat representation.
    pub fn root_op_children(&self) -> Option<(Operator, Vec<Expr>)> {
        let pos = self.root_index()?;
        match &self.nodes[pos].term {
            Term::Op { op, .. } => {
                let children = self
                    .children_of(pos)
                    .into_iter()
                    .map(|c| self.detach_subtree(c))
                    .collect();
                Some((*op, children))
            }
            _ => None,
        }
    }

    /// Rebuilds `self` from scratch as `op` applied to `children`
    /// (collapsing to the lone child, or to zero, if fewer than two are
    /// given).
    pub fn rebuild_from_children(&mut self, op: Operator, mut children: Vec<Expr>) {
        match children.len() {
            0 => {
                *self = Expr::from_int(BigInt::zero());
            }
            1 => {
                *self = children.pop().unwrap();
            }
            n => {
                let mut out = Expr::new();
                for child in children {
                    out.splice_append(&child);
                }
                out.append_op(op, n, SourceRange::unknown());
                *self = out;
            }
        }
    }

    /// Appends a clone of `other` as a new depth-0 term run (used by
    /// `rebuild_from_children`; `other` must be a complete, depth-0-rooted
    /// expression as produced by `detach_subtree`).
    fn splice_append(&mut self, other: &Expr) {
        for node in &other.nodes {
            self.nodes.push(node.clone());
        }
    }

    /// Append a leaf term at depth 0.
    pub fn append_term(&mut self, leaf: Leaf, source: SourceRange) {
        self.nodes.push(Node {
            term: Term::Leaf(leaf),
            depth: 0,
            source,
        });
    }

    /// Append an operator over the `nchild` terms most recently appended.
    pub fn append_op(&mut self, op: Operator, nchild: usize, source: SourceRange) {
        assert!(nchild > 0, "append_op: operator must have at least one child");
        if nchild == 1 && !op.is_unary() {
            // Identity: the lone child is already the result, drop the op.
            return;
        }
        assert!(
            !(nchild == 2 && op.is_unary()),
            "append_op: unary operator given two children"
        );
        assert!(
            !(nchild >= 3 && !op.is_associative()),
            "append_op: non-associative operator given {} children",
            nchild
        );
        for node in &mut self.nodes {
            node.depth += 1;
        }
        self.nodes.push(Node {
            term: Term::Op { op, nchild },
            depth: 0,
            source,
        });
    }

    /// Leftmost index of the subtree rooted at `pos`.
    fn subtree_start(&self, pos: usize) -> usize {
        match &self.nodes[pos].term {
            Term::Op { nchild, .. } => {
                let child_depth = self.nodes[pos].depth + 1;
                let mut remaining = *nchild;
                let mut i = pos;
                while remaining > 0 && i > 0 {
                    i -= 1;
                    if matches!(self.nodes[i].term, Term::Empty) {
                        continue;
                    }
                    if self.nodes[i].depth == child_depth {
                        i = self.subtree_start(i);
                        remaining -= 1;
                    }
                }
                i
            }
            _ => pos,
        }
    }

    /// Indices of the (at most all) direct children of the operator at
    /// `pos`, left to right.
    fn children_of(&self, pos: usize) -> Vec<usize> {
        let nchild = match &self.nodes[pos].term {
            Term::Op { nchild, .. } => *nchild,
            _ => return Vec::new(),
        };
        let child_depth = self.nodes[pos].depth + 1;
        let mut found = Vec::with_capacity(nchild);
        let mut i = pos;
        while found.len() < nchild && i > 0 {
            i -= 1;
            if matches!(self.nodes[i].term, Term::Empty) {
                continue;
            }
            if self.nodes[i].depth == child_depth {
                found.push(i);
                i = self.subtree_start(i);
            }
        }
        found.reverse();
        found
    }

    /// Deletes a single term (not its children, it has none) at `pos`.
    fn delete_leaf(&mut self, pos: usize) {
        self.nodes[pos].term = Term::Empty;
    }

    /// Deletes the entire subtree rooted at `pos`.
    fn delete_subtree(&mut self, pos: usize) {
        let start = self.subtree_start(pos);
        for node in &mut self.nodes[start..=pos] {
            node.term = Term::Empty;
        }
    }

    /// Replaces the subtree rooted at `pos` with a single leaf, clearing
    /// the rest of its former span.
    fn replace_subtree_with_leaf(&mut self, pos: usize, leaf: Leaf) {
        let start = self.subtree_start(pos);
        for node in &mut self.nodes[start..pos] {
            node.term = Term::Empty;
        }
        self.nodes[pos].term = Term::Leaf(leaf);
    }

    /// Removes the operator at `pos` in place, promoting its (single
    /// remaining) child subtree to the operator's former depth.
    fn promote_only_child(&mut self, pos: usize) {
        let children = self.children_of(pos);
        assert_eq!(children.len(), 1, "promote_only_child: expected exactly one child");
        let child = children[0];
        let start = self.subtree_start(child);
        for node in &mut self.nodes[start..=child] {
            node.depth -= 1;
        }
        self.nodes[pos].term = Term::Empty;
    }

    // -----------------------------------------------------------------
    // transform_neg
    // -----------------------------------------------------------------

    /// Rewrites subtraction and negation into canonical additive form.
    pub fn transform_neg(&mut self) {
        let mut pos = 0;
        while pos < self.nodes.len() {
            if let Term::Op { op, nchild } = self.nodes[pos].term {
                match op {
                    Operator::Sub if nchild == 2 => {
                        // a - b -> a + (-b)
                        let children = self.children_of(pos);
                        let rhs = children[1];
                        self.negate_subtree_in_place(rhs);
                        self.nodes[pos].term = Term::Op {
                            op: Operator::Add,
                            nchild: 2,
                        };
                    }
                    Operator::Neg => {
                        let children = self.children_of(pos);
                        let child = children[0];
                        match &self.nodes[child].term {
                            Term::Leaf(Leaf::Int(n)) => {
                                let negated = n.calc(Operator::Neg, None).unwrap_or_else(|_| n.clone());
                                self.replace_subtree_with_leaf(pos, Leaf::Int(negated));
                            }
                            Term::Leaf(Leaf::Float(f)) => {
                                let negated = f.calc(Operator::Neg, None).unwrap_or(*f);
                                self.replace_subtree_with_leaf(pos, Leaf::Float(negated));
                            }
                            Term::Op {
                                op: Operator::Sub, ..
                            } => {
                                // -(a - b) -> (-a) + b
                                let grandchildren = self.children_of(child);
                                let (a, b) = (grandchildren[0], grandchildren[1]);
                                self.negate_subtree_in_place(a);
                                self.nodes[child].term = Term::Op {
                                    op: Operator::Add,
                                    nchild: 2,
                                };
                                let _ = b;
                                self.promote_only_child_keep(pos, child);
                            }
                            _ => {
                                // NEG of a generic expression -> (-1) * e
                                self.promote_only_child_keep(pos, child);
                                // promote_only_child_keep already removed the
                                // NEG op; now wrap with MUL(-1, e) by reusing
                                // the freed NEG slot as the MUL node.
                                self.wrap_mul_neg_one(pos, child);
                            }
                        }
                    }
                    _ => {}
                }
            }
            pos += 1;
        }
    }

    /// Negates the subtree at `pos` in place (used by `transform_neg`),
    /// folding immediately if it is already a constant.
    fn negate_subtree_in_place(&mut self, pos: usize) {
        match &self.nodes[pos].term {
            Term::Leaf(Leaf::Int(n)) => {
                if let Ok(negated) = n.calc(Operator::Neg, None) {
                    self.nodes[pos].term = Term::Leaf(Leaf::Int(negated));
                    return;
                }
            }
            Term::Leaf(Leaf::Float(f)) => {
                if let Ok(negated) = f.calc(Operator::Neg, None) {
                    self.nodes[pos].term = Term::Leaf(Leaf::Float(negated));
                    return;
                }
            }
            _ => {}
        }
        self.wrap_mul_neg_one_grow(pos);
    }

    /// Promotes `child`'s depth to take over `pos`'s depth, then frees
    /// `pos`. Used where the op at `pos` is being removed but `child`
    /// (already transformed in place) should take its spot.
    fn promote_only_child_keep(&mut self, pos: usize, child: usize) {
        let start = self.subtree_start(child);
        let delta = self.nodes[child].depth - self.nodes[pos].depth;
        if delta > 0 {
            for node in &mut self.nodes[start..=child] {
                node.depth -= delta;
            }
        }
        self.nodes[pos].term = Term::Empty;
    }

    /// Wraps the subtree at `pos` with `MUL(-1, subtree)`, growing the
    /// term vector by one and bumping depths of the subtree by one.
    fn wrap_mul_neg_one_grow(&mut self, pos: usize) {
        let start = self.subtree_start(pos);
        let base_depth = self.nodes[pos].depth;
        for node in &mut self.nodes[start..=pos] {
            node.depth += 1;
        }
        let source = self.nodes[pos].source;
        self.nodes.insert(
            start,
            Node {
                term: Term::Leaf(Leaf::Int(BigInt::from(-1))),
                depth: base_depth + 1,
                source,
            },
        );
        self.nodes.insert(
            pos + 2,
            Node {
                term: Term::Op {
                    op: Operator::Mul,
                    nchild: 2,
                },
                depth: base_depth,
                source,
            },
        );
    }

    /// Same idea as [`Expr::wrap_mul_neg_one_grow`] but reuses a slot that
    /// was just freed by `promote_only_child_keep` (no vector growth).
    fn wrap_mul_neg_one(&mut self, freed_slot: usize, child: usize) {
        let start = self.subtree_start(child);
        let base_depth = self.nodes[child].depth;
        for node in &mut self.nodes[start..=child] {
            node.depth += 1;
        }
        let source = self.nodes[child].source;
        self.nodes[freed_slot] = Node {
            term: Term::Leaf(Leaf::Int(BigInt::from(-1))),
            depth: base_depth + 1,
            source,
        };
        // freed_slot sits immediately before start..=child in postfix
        // order only when freed_slot == start - 1; transform_neg always
        // frees the NEG node that directly preceded its child's subtree,
        // so this holds by construction.
        self.nodes.insert(
            child + 1,
            Node {
                term: Term::Op {
                    op: Operator::Mul,
                    nchild: 2,
                },
                depth: base_depth,
                source,
            },
        );
    }

    // -----------------------------------------------------------------
    // level_op
    // -----------------------------------------------------------------

    /// Simplifies the operator at `pos` in place: flattens nested runs of
    /// the same associative operator, folds constant children, applies
    /// algebraic identities, and collapses to a single child or zero.
    ///
    /// `preserve_reg_mul` keeps a literal `1 * reg` multiplication from being
    /// dropped (addressing-mode analysis in a front end needs the explicit
    /// scale factor); everywhere else identities are always dropped.
    pub fn level_op(&mut self, pos: usize, diag: &mut dyn DiagnosticSink, preserve_reg_mul: bool) {
        let (op, _nchild) = match &self.nodes[pos].term {
            Term::Op { op, nchild } => (*op, *nchild),
            _ => return,
        };

        // SEG of a SEGOFF: replace with the segment half.
        if op == Operator::Seg {
            let children = self.children_of(pos);
            if children.len() == 1 {
                if let Term::Op {
                    op: Operator::SegOff,
                    ..
                } = &self.nodes[children[0]].term
                {
                    let segoff_pos = children[0];
                    let seg = self.children_of(segoff_pos)[0];
                    let _ = self.extract_lhs(segoff_pos);
                    self.promote_only_child_keep(pos, seg);
                    return;
                }
            }
        }

        // `SEG`/`WRT`/`SEGOFF` are not numeric: folding their children
        // through `BigInt::calc` would spuriously error even on constant
        // operands. Leave them structurally untouched here — a plain `SEG`
        // of something other than a `SEGOFF` or a symbol is a pass-through
        // at this stage; shape validation happens later, in
        // `Value::finalize`.
        if op.is_non_numeric() {
            return;
        }

        // Flatten nested same-operator associative children.
        if op.is_associative() {
            loop {
                let mut spliced = false;
                for child in self.children_of(pos) {
                    if let Term::Op {
                        op: child_op,
                        nchild: child_n,
                    } = &self.nodes[child].term
                    {
                        if *child_op == op {
                            let grandchildren = self.children_of(child);
                            for gc in &grandchildren {
                                let start = self.subtree_start(*gc);
                                for node in &mut self.nodes[start..=*gc] {
                                    node.depth -= 1;
                                }
                            }
                            if let Term::Op { nchild, .. } = &mut self.nodes[pos].term {
                                *nchild = *nchild - 1 + child_n;
                            }
                            self.nodes[child].term = Term::Empty;
                            spliced = true;
                            break;
                        }
                    }
                }
                if !spliced {
                    break;
                }
            }
        }

        // Fold every constant child into a running accumulator.
        self.fold_constants(pos, op, diag);

        // Identities, now that constants are collapsed as far as possible.
        self.apply_identities(pos, op, preserve_reg_mul);

        // Collapse to a single remaining child, or to zero.
        let children = self.children_of(pos);
        match children.len() {
            0 => {
                self.replace_subtree_with_leaf(pos, Leaf::Int(BigInt::zero()));
            }
            1 => {
                let child = children[0];
                if op.is_unary() {
                    match &self.nodes[child].term {
                        Term::Leaf(Leaf::Int(n)) => match n.calc(op, None) {
                            Ok(v) => {
                                self.replace_subtree_with_leaf(pos, Leaf::Int(v));
                                return;
                            }
                            Err(e) => {
                                self.report_arithmetic_error(diag, pos, e);
                                return;
                            }
                        },
                        Term::Leaf(Leaf::Float(f)) if op == Operator::Neg => {
                            match f.calc_checked(op, None) {
                                Ok((v, flags)) => {
                                    self.report_float_flags(diag, pos, flags);
                                    self.replace_subtree_with_leaf(pos, Leaf::Float(v));
                                    return;
                                }
                                Err(e) => {
                                    self.report_arithmetic_error(diag, pos, e);
                                    return;
                                }
                            }
                        }
                        _ => {}
                    }
                }
                if !op.is_unary() {
                    self.promote_only_child(pos);
                }
            }
            _ => {}
        }
    }

    fn report_arithmetic_error(&self, diag: &mut dyn DiagnosticSink, pos: usize, e: ArithmeticError) {
        let kind = match e {
            ArithmeticError::DivideByZero => DiagnosticKind::ErrDivideByZero,
            ArithmeticError::InvalidFloatOp => DiagnosticKind::ErrFloatInvalidOp,
            ArithmeticError::Overflow => DiagnosticKind::WarnValueOverflow,
            ArithmeticError::NonNumericOp => DiagnosticKind::ErrTooComplexExpression,
        };
        diag.report(Diagnostic {
            kind,
            source: self.nodes[pos].source,
            args: vec![],
        });
    }

    fn fold_constants(&mut self, pos: usize, op: Operator, diag: &mut dyn DiagnosticSink) {
        self.fold_int_constants(pos, op, diag);
        self.fold_float_constants(pos, op, diag);
    }

    fn fold_int_constants(&mut self, pos: usize, op: Operator, diag: &mut dyn DiagnosticSink) {
        let children = self.children_of(pos);
        let int_positions: Vec<usize> = children
            .iter()
            .copied()
            .filter(|&c| matches!(self.nodes[c].term, Term::Leaf(Leaf::Int(_))))
            .collect();
        if int_positions.len() < 2 {
            return;
        }
        if int_positions.len() != children.len() && !op.is_associative() {
            return;
        }
        let mut acc: Option<BigInt> = None;
        for &c in &int_positions {
            let v = match &self.nodes[c].term {
                Term::Leaf(Leaf::Int(n)) => n.clone(),
                _ => unreachable!(),
            };
            acc = Some(match acc {
                None => v,
                Some(a) => match a.calc(op, Some(&v)) {
                    Ok(r) => r,
                    Err(e) => {
                        self.report_arithmetic_error(diag, pos, e);
                        return;
                    }
                },
            });
        }
        let folded = match acc {
            Some(v) => v,
            None => return,
        };
        if int_positions.len() == children.len() {
            self.replace_subtree_with_leaf(pos, Leaf::Int(folded));
            return;
        }
        // Keep the folded constant as one child, delete the rest.
        let keep = int_positions[0];
        self.nodes[keep].term = Term::Leaf(Leaf::Int(folded));
        for &c in &int_positions[1..] {
            self.delete_subtree(c);
        }
        if let Term::Op { nchild, .. } = &mut self.nodes[pos].term {
            *nchild -= int_positions.len() - 1;
        }
    }

    fn fold_float_constants(&mut self, pos: usize, op: Operator, diag: &mut dyn DiagnosticSink) {
        if !matches!(
            op,
            Operator::Add
                | Operator::Sub
                | Operator::Mul
                | Operator::Div
                | Operator::SignDiv
                | Operator::Mod
                | Operator::SignMod
        ) {
            return;
        }
        let children = self.children_of(pos);
        let float_positions: Vec<usize> = children
            .iter()
            .copied()
            .filter(|&c| matches!(self.nodes[c].term, Term::Leaf(Leaf::Float(_))))
            .collect();
        if float_positions.len() < 2 {
            return;
        }
        if float_positions.len() != children.len() && !op.is_associative() {
            return;
        }
        let mut acc: Option<Float> = None;
        for &c in &float_positions {
            let v = match &self.nodes[c].term {
                Term::Leaf(Leaf::Float(f)) => *f,
                _ => unreachable!(),
            };
            acc = Some(match acc {
                None => v,
                Some(a) => match a.calc_checked(op, Some(&v)) {
                    Ok((r, flags)) => {
                        self.report_float_flags(diag, pos, flags);
                        r
                    }
                    Err(e) => {
                        self.report_arithmetic_error(diag, pos, e);
                        return;
                    }
                },
            });
        }
        let folded = match acc {
            Some(v) => v,
            None => return,
        };
        if float_positions.len() == children.len() {
            self.replace_subtree_with_leaf(pos, Leaf::Float(folded));
            return;
        }
        let keep = float_positions[0];
        self.nodes[keep].term = Term::Leaf(Leaf::Float(folded));
        for &c in &float_positions[1..] {
            self.delete_subtree(c);
        }
        if let Term::Op { nchild, .. } = &mut self.nodes[pos].term {
            *nchild -= float_positions.len() - 1;
        }
    }

    fn report_float_flags(&self, diag: &mut dyn DiagnosticSink, pos: usize, flags: crate::float::FloatFlags) {
        if flags.overflow {
            diag.report(Diagnostic {
                kind: DiagnosticKind::WarnFloatOverflow,
                source: self.nodes[pos].source,
                args: vec![],
            });
        }
        if flags.underflow {
            diag.report(Diagnostic {
                kind: DiagnosticKind::WarnFloatUnderflow,
                source: self.nodes[pos].source,
                args: vec![],
            });
        }
        if flags.inexact {
            diag.report(Diagnostic {
                kind: DiagnosticKind::WarnFloatInexact,
                source: self.nodes[pos].source,
                args: vec![],
            });
        }
    }

    fn apply_identities(&mut self, pos: usize, op: Operator, preserve_reg_mul: bool) {
        let children = self.children_of(pos);
        if children.is_empty() {
            return;
        }
        let is_zero = |e: &Expr, c: usize| matches!(&e.nodes[c].term, Term::Leaf(Leaf::Int(n)) if n.is_zero());
        let is_one = |e: &Expr, c: usize| matches!(&e.nodes[c].term, Term::Leaf(Leaf::Int(n)) if n.is_pos1());
        let is_neg1 = |e: &Expr, c: usize| matches!(&e.nodes[c].term, Term::Leaf(Leaf::Int(n)) if n.is_neg1());
        let is_all_ones = |e: &Expr, c: usize| is_neg1(e, c);
        let last = children.len() - 1;

        for (idx, &c) in children.iter().enumerate() {
            let is_first = idx == 0;
            let is_last = idx == last;
            let drop = match op {
                // `x * 1` (right identity, any position but the first) always
                // drops; `1 * x` (left identity) drops too, unless the whole
                // subtree multiplies a register and the caller asked to keep
                // the literal scale factor for addressing-mode analysis.
                Operator::Mul => {
                    is_one(self, c)
                        && (!is_first || !(preserve_reg_mul && self.contains(LeafKind::Register, pos)))
                }
                Operator::Div => is_one(self, c) && is_last,
                Operator::Add => is_zero(self, c),
                Operator::Sub => is_zero(self, c) && is_last,
                Operator::And => is_all_ones(self, c),
                Operator::Or => is_zero(self, c),
                Operator::Shl | Operator::Shr => is_zero(self, c) && is_last,
                _ => false,
            };
            if drop && children.len() > 1 {
                self.delete_subtree(c);
                if let Term::Op { nchild, .. } = &mut self.nodes[pos].term {
                    *nchild -= 1;
                }
                return self.apply_identities(pos, op, preserve_reg_mul);
            }
        }

        // Absorbing identities replace the whole subtree with a constant.
        for &c in &children {
            let absorb = match op {
                Operator::Mul | Operator::And | Operator::LAnd => is_zero(self, c),
                Operator::Or => is_all_ones(self, c),
                _ => false,
            };
            if absorb {
                let value = if matches!(op, Operator::Or) {
                    BigInt::from(-1)
                } else {
                    BigInt::zero()
                };
                self.replace_subtree_with_leaf(pos, Leaf::Int(value));
                return;
            }
        }
    }

    // -----------------------------------------------------------------
    // simplify
    // -----------------------------------------------------------------

    /// `transform_neg`, then `level_op` at every operator (bottom-up, since
    /// children always precede their operator in the flat sequence), then
    /// sweeps away empty sentinels. Equivalent to
    /// `simplify_with(diag, false)` — a literal `1 * reg` addressing-mode
    /// scale factor is dropped like any other identity.
    pub fn simplify(&mut self, diag: &mut dyn DiagnosticSink) {
        self.simplify_with(diag, false)
    }

    /// `simplify`, but with `preserve_reg_mul` passed through to every
    /// `level_op` call: when true, a `1 * reg` term survives instead of
    /// being dropped as a multiplicative identity, for front ends whose
    /// addressing-mode analysis needs the explicit scale factor.
    pub fn simplify_with(&mut self, diag: &mut dyn DiagnosticSink, preserve_reg_mul: bool) {
        self.transform_neg();
        let mut pos = 0;
        while pos < self.nodes.len() {
            if matches!(self.nodes[pos].term, Term::Op { .. }) {
                self.level_op(pos, diag, preserve_reg_mul);
            }
            pos += 1;
        }
        self.nodes.retain(|n| !matches!(n.term, Term::Empty));
    }

    // -----------------------------------------------------------------
    // contains / substitute / expand_equ
    // -----------------------------------------------------------------

    /// True if any live leaf anywhere in the expression has the given
    /// kind (a whole-tree convenience over [`Expr::contains`]).
    pub fn contains_anywhere(&self, kind: LeafKind) -> bool {
        match self.root_index() {
            Some(root) => self.contains(kind, root),
            None => false,
        }
    }

    /// True if the subtree rooted at `pos` contains a leaf of `kind`.
    pub fn contains(&self, kind: LeafKind, pos: usize) -> bool {
        let start = self.subtree_start(pos);
        self.nodes[start..=pos]
            .iter()
            .any(|n| matches!(&n.term, Term::Leaf(l) if l.kind() == kind))
    }

    /// Replaces every `subst(i)` placeholder with a copy of `terms[i]`.
    pub fn substitute(&mut self, terms: &[Expr]) -> Result<(), ReferenceError> {
        loop {
            let target = self
                .nodes
                .iter()
                .position(|n| matches!(&n.term, Term::Leaf(Leaf::Subst(_))));
            let idx = match target {
                Some(i) => i,
                None => return Ok(()),
            };
            let index = match &self.nodes[idx].term {
                Term::Leaf(Leaf::Subst(i)) => *i,
                _ => unreachable!(),
            };
            let replacement = terms
                .get(index)
                .ok_or(ReferenceError::SubstIndexOutOfRange)?;
            self.splice_in(idx, replacement);
        }
    }

    /// Splices a clone of `replacement` into `self` at the single-index
    /// slot `idx`, re-rooting it at `idx`'s former depth.
    fn splice_in(&mut self, idx: usize, replacement: &Expr) {
        if replacement.nodes.is_empty() {
            self.nodes[idx].term = Term::Leaf(Leaf::Int(BigInt::zero()));
            return;
        }
        let base_depth = self.nodes[idx].depth;
        let source = self.nodes[idx].source;
        let root_depth = replacement.nodes.last().unwrap().depth;
        let mut cloned: Vec<Node> = replacement
            .nodes
            .iter()
            .filter(|n| !matches!(n.term, Term::Empty))
            .map(|n| Node {
                term: n.term.clone(),
                depth: n.depth + base_depth - root_depth,
                source,
            })
            .collect();
        let last = cloned.pop().unwrap();
        self.nodes[idx] = last;
        // Insert the rest of the cloned subtree immediately before idx.
        for (offset, node) in cloned.into_iter().enumerate() {
            self.nodes.insert(idx + offset, node);
        }
    }

    /// Replaces every symbol leaf defined in an absolute section with the
    /// constant `section_start + offset_in_section`. Symbols not in an
    /// absolute section are left untouched.
    pub fn inline_absolute_symbols(&mut self, symtab: &dyn SymbolTable) {
        for node in &mut self.nodes {
            if let Term::Leaf(Leaf::Symbol(sym)) = &node.term {
                if let Some(section) = symtab.section_of(*sym) {
                    if let (Some(start), Some(offset)) = (
                        symtab.absolute_section_start(section),
                        symtab.offset_in_section(*sym),
                    ) {
                        let value = start.calc(Operator::Add, Some(&offset)).unwrap_or(start);
                        node.term = Term::Leaf(Leaf::Int(value));
                    }
                }
            }
        }
    }

    /// Inlines EQU definitions, detecting cycles via an explicit stack of
    /// symbols currently being expanded.
    pub fn expand_equ(&mut self, symtab: &dyn SymbolTable) -> Result<(), ReferenceError> {
        let mut stack = Vec::new();
        self.expand_equ_inner(symtab, &mut stack)
    }

    fn expand_equ_inner(
        &mut self,
        symtab: &dyn SymbolTable,
        stack: &mut Vec<SymbolId>,
    ) -> Result<(), ReferenceError> {
        loop {
            let target = self.nodes.iter().position(|n| {
                matches!(&n.term, Term::Leaf(Leaf::Symbol(sym)) if symtab.equ(*sym).is_some())
            });
            let idx = match target {
                Some(i) => i,
                None => return Ok(()),
            };
            let sym = match &self.nodes[idx].term {
                Term::Leaf(Leaf::Symbol(s)) => *s,
                _ => unreachable!(),
            };
            if stack.contains(&sym) {
                return Err(ReferenceError::CircularEqu);
            }
            stack.push(sym);
            let mut equ_expr = symtab.equ(sym).expect("checked above").clone();
            equ_expr.expand_equ_inner(symtab, stack)?;
            stack.pop();
            self.splice_in(idx, &equ_expr);
        }
    }

    // -----------------------------------------------------------------
    // extraction
    // -----------------------------------------------------------------

    /// Removes the 2-child operator at `pos` along with its right-hand
    /// subtree, returning the left-hand subtree as a standalone `Expr`.
    fn extract_lhs(&mut self, pos: usize) -> Expr {
        let children = self.children_of(pos);
        assert_eq!(children.len(), 2, "extract_lhs: operator must have two children");
        let (lhs, rhs) = (children[0], children[1]);
        let extracted = self.detach_subtree(lhs);
        self.delete_subtree(rhs);
        self.nodes[pos].term = Term::Empty;
        extracted
    }

    /// Clones the subtree at `pos` out into a standalone, depth-0-rooted
    /// `Expr` without modifying `self`.
    fn detach_subtree(&self, pos: usize) -> Expr {
        let start = self.subtree_start(pos);
        let root_depth = self.nodes[pos].depth;
        let nodes = self.nodes[start..=pos]
            .iter()
            .filter(|n| !matches!(n.term, Term::Empty))
            .map(|n| Node {
                term: n.term.clone(),
                depth: n.depth - root_depth,
                source: n.source,
            })
            .collect();
        Expr { nodes }
    }

    /// If the root is `SEGOFF`, extracts it into `(segment, offset)`.
    pub fn extract_segoff(&mut self) -> Option<(Expr, Expr)> {
        let pos = self.root_index()?;
        match &self.nodes[pos].term {
            Term::Op {
                op: Operator::SegOff,
                ..
            } => {
                let children = self.children_of(pos);
                let (seg, off) = (children[0], children[1]);
                let seg_expr = self.detach_subtree(seg);
                let off_expr = self.detach_subtree(off);
                self.delete_subtree(pos);
                Some((seg_expr, off_expr))
            }
            _ => None,
        }
    }

    /// Searches the whole tree for the first `SEGOFF` and extracts it into
    /// `(segment, offset)`, removing it from `self` without promoting
    /// anything in its place (the rest of the tree is untouched).
    pub fn extract_deep_segoff(&mut self) -> Option<(Expr, Expr)> {
        let pos = self.nodes.iter().position(|n| {
            matches!(n.term, Term::Op { op: Operator::SegOff, .. })
        })?;
        let children = self.children_of(pos);
        let (seg, off) = (children[0], children[1]);
        let seg_expr = self.detach_subtree(seg);
        let off_expr = self.detach_subtree(off);
        self.delete_subtree(pos);
        Some((seg_expr, off_expr))
    }

    /// Searches the tree for the first `WRT`, detaches the base (right
    /// operand) as a standalone `Expr`, and promotes the left operand
    /// (the thing being related to that base) into the `WRT` node's spot.
    pub fn extract_wrt(&mut self) -> Option<Expr> {
        let pos = self.nodes.iter().position(|n| {
            matches!(n.term, Term::Op { op: Operator::Wrt, .. })
        })?;
        let children = self.children_of(pos);
        let (lhs, rhs) = (children[0], children[1]);
        let base_expr = self.detach_subtree(rhs);
        self.delete_subtree(rhs);
        self.promote_only_child_keep(pos, lhs);
        Some(base_expr)
    }

    // -----------------------------------------------------------------
    // distance folding
    // -----------------------------------------------------------------

    /// Folds every `loc - loc` sub-pattern — a `MUL` of `-1` and a
    /// location leaf, combined under `ADD` with another location leaf —
    /// into the computed integer distance, then re-simplifies.
    pub fn simplify_calc_dist(
        &mut self,
        bc: &dyn crate::bytecode::BytecodeSink,
        diag: &mut dyn DiagnosticSink,
    ) {
        self.fold_distances(|a, b| crate::location::calc_dist(bc, a, b));
        self.simplify(diag);
    }

    /// Same, but only folds distances computable without assigned
    /// bytecode offsets (safe to call before optimization).
    pub fn simplify_calc_dist_no_bc(
        &mut self,
        bc: &dyn crate::bytecode::BytecodeSink,
        diag: &mut dyn DiagnosticSink,
    ) {
        self.fold_distances(|a, b| crate::location::calc_dist_no_bc(bc, a, b));
        self.simplify(diag);
    }

    fn fold_distances(&mut self, dist: impl Fn(Location, Location) -> Option<BigInt>) {
        let mut pos = 0;
        while pos < self.nodes.len() {
            if let Term::Op {
                op: Operator::Add,
                nchild,
            } = self.nodes[pos].term
            {
                if nchild == 2 {
                    let children = self.children_of(pos);
                    let (a, b) = (children[0], children[1]);
                    if let (Some(loc_a), Some(neg_loc_b)) =
                        (self.location_leaf(a), self.negated_location_leaf(b))
                    {
                        if let Some(d) = dist(loc_a, neg_loc_b) {
                            self.replace_subtree_with_leaf(pos, Leaf::Int(d));
                        }
                    } else if let (Some(neg_loc_a), Some(loc_b)) =
                        (self.negated_location_leaf(a), self.location_leaf(b))
                    {
                        if let Some(d) = dist(loc_b, neg_loc_a) {
                            self.replace_subtree_with_leaf(pos, Leaf::Int(d));
                        }
                    }
                }
            }
            pos += 1;
        }
    }

    fn location_leaf(&self, pos: usize) -> Option<Location> {
        match &self.nodes[pos].term {
            Term::Leaf(Leaf::Location(loc)) => Some(*loc),
            _ => None,
        }
    }

    /// Recognizes `MUL(-1, location)`.
    fn negated_location_leaf(&self, pos: usize) -> Option<Location> {
        if let Term::Op {
            op: Operator::Mul,
            nchild: 2,
        } = &self.nodes[pos].term
        {
            let children = self.children_of(pos);
            let (a, b) = (children[0], children[1]);
            let neg1 = |e: &Expr, c: usize| {
                matches!(&e.nodes[c].term, Term::Leaf(Leaf::Int(n)) if n.is_neg1())
            };
            if neg1(self, a) {
                return self.location_leaf(b);
            }
            if neg1(self, b) {
                return self.location_leaf(a);
            }
        }
        None
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        if self.nodes.len() != other.nodes.len() {
            return false;
        }
        self.nodes
            .iter()
            .zip(other.nodes.iter())
            .all(|(a, b)| a.term == b.term && a.depth == b.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::VecDiagnosticSink;
    use matches::assert_matches;

    fn leaf_int(e: &mut Expr, v: i64) {
        e.append_term(Leaf::Int(BigInt::from(v)), SourceRange::unknown());
    }

    #[test]
    fn simple_constant_fold_add() {
        let mut e = Expr::new();
        leaf_int(&mut e, 2);
        leaf_int(&mut e, 3);
        e.append_op(Operator::Add, 2, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify(&mut diag);
        assert_eq!(e.as_int(), Some(&BigInt::from(5)));
        assert!(diag.diagnostics.is_empty());
    }

    #[test]
    fn right_identity_drops_add_zero() {
        let mut e = Expr::new();
        leaf_int(&mut e, 7);
        e.append_term(Leaf::Register(RegisterId(0)), SourceRange::unknown());
        // Can't fold a register, so keep an explicit non-constant term to
        // verify identity dropping without full constant collapse.
        let mut sum = Expr::new();
        leaf_int(&mut sum, 0);
        sum.append_term(Leaf::Register(RegisterId(1)), SourceRange::unknown());
        sum.append_op(Operator::Add, 2, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        sum.simplify(&mut diag);
        assert_matches!(
            sum.nodes.last().unwrap().term,
            Term::Leaf(Leaf::Register(RegisterId(1)))
        );
    }

    #[test]
    fn one_times_register_drops_by_default() {
        let mut e = Expr::new();
        leaf_int(&mut e, 1);
        e.append_term(Leaf::Register(RegisterId(0)), SourceRange::unknown());
        e.append_op(Operator::Mul, 2, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify(&mut diag);
        assert_matches!(
            e.nodes.last().unwrap().term,
            Term::Leaf(Leaf::Register(RegisterId(0)))
        );
        assert_eq!(e.nodes.len(), 1, "the literal 1 must be dropped, not just promoted alongside it");
    }

    #[test]
    fn one_times_register_survives_when_preserved_for_addressing_modes() {
        let mut e = Expr::new();
        leaf_int(&mut e, 1);
        e.append_term(Leaf::Register(RegisterId(0)), SourceRange::unknown());
        e.append_op(Operator::Mul, 2, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify_with(&mut diag, true);
        let (op, children) = e.root_op_children().expect("MUL(1, reg) must survive intact");
        assert_eq!(op, Operator::Mul);
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn register_times_one_drops_regardless_of_preserve_flag() {
        // `reg * 1` (the literal on the right) isn't the addressing-mode
        // scale-factor idiom `1 * reg`, so it's dropped even when
        // `preserve_reg_mul` is set.
        let mut e = Expr::new();
        e.append_term(Leaf::Register(RegisterId(0)), SourceRange::unknown());
        leaf_int(&mut e, 1);
        e.append_op(Operator::Mul, 2, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify_with(&mut diag, true);
        assert_matches!(
            e.nodes.last().unwrap().term,
            Term::Leaf(Leaf::Register(RegisterId(0)))
        );
    }

    #[test]
    fn divide_by_zero_reports_diagnostic() {
        let mut e = Expr::new();
        leaf_int(&mut e, 1);
        leaf_int(&mut e, 0);
        e.append_op(Operator::Div, 2, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify(&mut diag);
        assert_eq!(diag.diagnostics.len(), 1);
        assert_eq!(diag.diagnostics[0].kind, DiagnosticKind::ErrDivideByZero);
    }

    #[test]
    fn transform_neg_rewrites_subtraction() {
        let mut e = Expr::new();
        leaf_int(&mut e, 10);
        leaf_int(&mut e, 3);
        e.append_op(Operator::Sub, 2, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify(&mut diag);
        assert_eq!(e.as_int(), Some(&BigInt::from(7)));
    }

    #[test]
    fn double_negative_cancels() {
        let mut e = Expr::new();
        e.append_term(Leaf::Register(RegisterId(3)), SourceRange::unknown());
        e.append_op(Operator::Neg, 1, SourceRange::unknown());
        e.append_op(Operator::Neg, 1, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify(&mut diag);
        // -(-reg) simplifies to (-1)*((-1)*reg); constants don't fold
        // across the register, but no error should be raised and the
        // register leaf must still be reachable.
        assert!(e.contains(LeafKind::Register, e.root_index().unwrap()));
    }

    #[test]
    fn substitute_replaces_placeholder() {
        let mut e = Expr::new();
        e.append_term(Leaf::Subst(0), SourceRange::unknown());
        leaf_int(&mut e, 5);
        e.append_op(Operator::Add, 2, SourceRange::unknown());
        let replacement = Expr::from_int(BigInt::from(9));
        e.substitute(&[replacement]).unwrap();
        let mut diag = VecDiagnosticSink::new();
        e.simplify(&mut diag);
        assert_eq!(e.as_int(), Some(&BigInt::from(14)));
    }

    #[test]
    fn substitute_out_of_range_errors() {
        let mut e = Expr::new();
        e.append_term(Leaf::Subst(3), SourceRange::unknown());
        assert_eq!(
            e.substitute(&[]).unwrap_err(),
            ReferenceError::SubstIndexOutOfRange
        );
    }

    #[test]
    fn contains_finds_symbol_leaf() {
        let mut e = Expr::new();
        e.append_term(Leaf::Symbol(SymbolId(1)), SourceRange::unknown());
        leaf_int(&mut e, 4);
        e.append_op(Operator::Add, 2, SourceRange::unknown());
        let root = e.root_index().unwrap();
        assert!(e.contains(LeafKind::Symbol, root));
        assert!(!e.contains(LeafKind::Register, root));
    }

    #[test]
    fn extract_segoff_splits_halves() {
        let mut e = Expr::new();
        e.append_term(Leaf::Symbol(SymbolId(10)), SourceRange::unknown());
        leaf_int(&mut e, 0x100);
        e.append_op(Operator::SegOff, 2, SourceRange::unknown());
        let (seg, off) = e.extract_segoff().unwrap();
        assert_matches!(seg.nodes[0].term, Term::Leaf(Leaf::Symbol(SymbolId(10))));
        assert_eq!(off.as_int(), Some(&BigInt::from(0x100)));
    }

    #[test]
    fn extract_wrt_keeps_base_symbol_in_place() {
        let mut e = Expr::new();
        e.append_term(Leaf::Symbol(SymbolId(1)), SourceRange::unknown());
        e.append_term(Leaf::Symbol(SymbolId(2)), SourceRange::unknown());
        e.append_op(Operator::Wrt, 2, SourceRange::unknown());
        let base = e.extract_wrt().unwrap();
        assert_matches!(base.nodes[0].term, Term::Leaf(Leaf::Symbol(SymbolId(2))));
        let root = e.root_index().unwrap();
        assert_matches!(e.nodes[root].term, Term::Leaf(Leaf::Symbol(SymbolId(1))));
    }

    #[test]
    fn seg_of_segoff_uses_extract_lhs_and_keeps_segment() {
        // SEG(SEGOFF(sym, offset)) should keep only `sym`.
        let mut e = Expr::new();
        e.append_term(Leaf::Symbol(SymbolId(7)), SourceRange::unknown());
        leaf_int(&mut e, 0x40);
        e.append_op(Operator::SegOff, 2, SourceRange::unknown());
        e.append_op(Operator::Seg, 1, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify(&mut diag);
        assert!(diag.diagnostics.is_empty());
        let root = e.root_index().unwrap();
        assert_matches!(e.nodes[root].term, Term::Leaf(Leaf::Symbol(SymbolId(7))));
    }

    fn leaf_float(e: &mut Expr, v: f64) {
        e.append_term(Leaf::Float(Float::from_f64(v)), SourceRange::unknown());
    }

    #[test]
    fn float_constants_fold_through_add() {
        let mut e = Expr::new();
        leaf_float(&mut e, 1.5);
        leaf_float(&mut e, 2.5);
        e.append_op(Operator::Add, 2, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify(&mut diag);
        assert_eq!(e.as_float(), Some(Float::from_f64(4.0)));
        assert!(diag.diagnostics.is_empty());
    }

    #[test]
    fn float_constants_fold_through_mul_leaving_non_constant_sibling() {
        // ADD(MUL(2.0, 3.0), reg) should fold the float pair and leave the
        // register term untouched.
        let mut e = Expr::new();
        leaf_float(&mut e, 2.0);
        leaf_float(&mut e, 3.0);
        e.append_op(Operator::Mul, 2, SourceRange::unknown());
        e.append_term(Leaf::Register(RegisterId(0)), SourceRange::unknown());
        e.append_op(Operator::Add, 2, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify(&mut diag);
        let (op, children) = e.root_op_children().expect("root is an operator");
        assert_eq!(op, Operator::Add);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].as_float(), Some(Float::from_f64(6.0)));
    }

    #[test]
    fn float_overflow_reports_warning_without_erroring() {
        let mut e = Expr::new();
        leaf_float(&mut e, f64::MAX);
        leaf_float(&mut e, f64::MAX);
        e.append_op(Operator::Add, 2, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify(&mut diag);
        assert!(diag
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::WarnFloatOverflow));
        assert!(!diag.has_errors());
    }

    #[test]
    fn float_division_reports_inexact() {
        let mut e = Expr::new();
        leaf_float(&mut e, 1.0);
        leaf_float(&mut e, 3.0);
        e.append_op(Operator::Div, 2, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify(&mut diag);
        assert!(diag
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::WarnFloatInexact));
    }

    #[test]
    fn float_negation_folds_through_unary_neg() {
        let mut e = Expr::new();
        leaf_float(&mut e, 2.0);
        e.append_op(Operator::Neg, 1, SourceRange::unknown());
        let mut diag = VecDiagnosticSink::new();
        e.simplify(&mut diag);
        assert_eq!(e.as_float(), Some(Float::from_f64(-2.0)));
        assert!(diag.diagnostics.is_empty());
    }
}
