// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::ir::expr::*;
use crate::ir::TypeCheck;
use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use std::num::NonZeroU32;

#[derive(PartialEq, Eq, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct StringRef(NonZeroU32);

impl Debug for StringRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "StringRef({})", self.index())
    }
}

impl StringRef {
    fn from_index(index: usize) -> Self {
        Self(NonZeroU32::new((index + 1) as u32).expect("string arena overflow"))
    }

    fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Context which is used to create all SMT expressions. Expressions are interned such that
/// reference equivalence implies structural equivalence.
///
/// Execution states only ever hold [`ExprRef`]s into this arena, which is how formulas are
/// shared between forked states without copying.
#[derive(Clone, Default)]
pub struct Context {
    strings: indexmap::IndexSet<String>,
    exprs: indexmap::IndexSet<Expr>,
    /// number of taint leaves handed out so far
    taint_count: u32,
}

/// Adding and removing nodes.
impl Context {
    pub fn get(&self, reference: ExprRef) -> &Expr {
        self.exprs
            .get_index(reference.index())
            .expect("Invalid ExprRef!")
    }

    pub(crate) fn add_expr(&mut self, value: Expr) -> ExprRef {
        let (index, _) = self.exprs.insert_full(value);
        ExprRef::from_index(index)
    }

    pub fn get_str(&self, reference: StringRef) -> &str {
        self.strings
            .get_index(reference.index())
            .expect("Invalid StringRef!")
    }

    pub fn string(&mut self, value: Cow<str>) -> StringRef {
        if let Some(index) = self.strings.get_index_of(value.as_ref()) {
            StringRef::from_index(index)
        } else {
            let (index, _) = self.strings.insert_full(value.into_owned());
            StringRef::from_index(index)
        }
    }

    /// Looks up a symbol by name without creating it.
    pub fn find_symbol(&self, name: &str, width: WidthInt) -> Option<ExprRef> {
        let name = StringRef::from_index(self.strings.get_index_of(name)?);
        self.exprs
            .get_index_of(&Expr::BVSymbol { name, width })
            .map(ExprRef::from_index)
    }

    /// Number of interned expressions.
    pub fn num_exprs(&self) -> usize {
        self.exprs.len()
    }
}

/// Convenience methods to construct IR nodes.
impl Context {
    pub fn bv_symbol(&mut self, name: &str, width: WidthInt) -> ExprRef {
        assert!(width > 0, "0-bit bitvectors are not allowed");
        let name = self.string(name.into());
        self.add_expr(Expr::BVSymbol { name, width })
    }

    pub fn bv_lit(&mut self, value: BVLiteralInt, width: WidthInt) -> ExprRef {
        assert!(width > 0, "0-bit bitvectors are not allowed");
        assert!(
            bv_value_fits_width(value, width),
            "{value} does not fit into {width} bits"
        );
        self.add_expr(Expr::BVLiteral { value, width })
    }

    /// Creates a fresh taint leaf. Never interned together with any other node.
    pub fn taint(&mut self, width: WidthInt) -> ExprRef {
        assert!(width > 0, "0-bit bitvectors are not allowed");
        let id = self.taint_count;
        self.taint_count += 1;
        self.add_expr(Expr::BVTaint { id, width })
    }

    pub fn zero(&mut self, width: WidthInt) -> ExprRef {
        self.bv_lit(0, width)
    }

    pub fn mask(&mut self, width: WidthInt) -> ExprRef {
        self.bv_lit(bv_mask_value(width), width)
    }

    pub fn one(&mut self, width: WidthInt) -> ExprRef {
        self.bv_lit(1, width)
    }

    pub fn tru(&mut self) -> ExprRef {
        self.one(1)
    }

    pub fn fals(&mut self) -> ExprRef {
        self.zero(1)
    }

    pub fn bool_lit(&mut self, value: bool) -> ExprRef {
        self.bv_lit(value as BVLiteralInt, 1)
    }

    pub fn bv_equal(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.add_expr(Expr::BVEqual(a, b))
    }

    pub fn bv_ite(&mut self, cond: ExprRef, tru: ExprRef, fals: ExprRef) -> ExprRef {
        self.add_expr(Expr::BVIte { cond, tru, fals })
    }

    pub fn implies(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.add_expr(Expr::BVImplies(a, b))
    }

    pub fn greater_signed(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.add_expr(Expr::BVGreaterSigned(a, b))
    }

    pub fn greater(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.add_expr(Expr::BVGreater(a, b))
    }

    pub fn greater_or_equal(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.add_expr(Expr::BVGreaterEqual(a, b))
    }

    pub fn less(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.greater(b, a)
    }

    pub fn less_or_equal(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        self.greater_or_equal(b, a)
    }

    pub fn not(&mut self, e: ExprRef) -> ExprRef {
        let width = e.get_width(self);
        self.add_expr(Expr::BVNot(e, width))
    }

    pub fn negate(&mut self, e: ExprRef) -> ExprRef {
        let width = e.get_width(self);
        self.add_expr(Expr::BVNegate(e, width))
    }

    pub fn and(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        let width = b.get_width(self);
        self.add_expr(Expr::BVAnd(a, b, width))
    }

    pub fn or(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        let width = b.get_width(self);
        self.add_expr(Expr::BVOr(a, b, width))
    }

    pub fn xor(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        let width = b.get_width(self);
        self.add_expr(Expr::BVXor(a, b, width))
    }

    pub fn shift_left(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        let width = b.get_width(self);
        self.add_expr(Expr::BVShiftLeft(a, b, width))
    }

    pub fn shift_right(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        let width = b.get_width(self);
        self.add_expr(Expr::BVShiftRight(a, b, width))
    }

    pub fn add(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        let width = b.get_width(self);
        self.add_expr(Expr::BVAdd(a, b, width))
    }

    pub fn sub(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        let width = b.get_width(self);
        self.add_expr(Expr::BVSub(a, b, width))
    }

    pub fn mul(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        let width = b.get_width(self);
        self.add_expr(Expr::BVMul(a, b, width))
    }

    pub fn concat(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        let width = a.get_width(self) + b.get_width(self);
        self.add_expr(Expr::BVConcat(a, b, width))
    }

    pub fn slice(&mut self, e: ExprRef, hi: WidthInt, lo: WidthInt) -> ExprRef {
        if lo == 0 && hi + 1 == e.get_width(self) {
            e
        } else {
            assert!(hi >= lo, "{hi} < {lo} ... not allowed!");
            self.add_expr(Expr::BVSlice { e, hi, lo })
        }
    }

    pub fn zero_extend(&mut self, e: ExprRef, by: WidthInt) -> ExprRef {
        if by == 0 {
            e
        } else {
            let width = e.get_width(self) + by;
            self.add_expr(Expr::BVZeroExt { e, by, width })
        }
    }

    /// Zero extends or truncates `e` to exactly `width` bits.
    pub fn resize(&mut self, e: ExprRef, width: WidthInt) -> ExprRef {
        let current = e.get_width(self);
        if current < width {
            self.zero_extend(e, width - current)
        } else {
            self.slice(e, width - 1, 0)
        }
    }

    /// Conjunction of all `items`. Returns `true` for an empty iterator.
    pub fn and_many(&mut self, items: impl IntoIterator<Item = ExprRef>) -> ExprRef {
        let mut items = items.into_iter();
        match items.next() {
            None => self.tru(),
            Some(first) => items.fold(first, |acc, e| self.and(acc, e)),
        }
    }

    /// Disjunction of all `items`. Returns `false` for an empty iterator.
    pub fn or_many(&mut self, items: impl IntoIterator<Item = ExprRef>) -> ExprRef {
        let mut items = items.into_iter();
        match items.next() {
            None => self.fals(),
            Some(first) => items.fold(first, |acc, e| self.or(acc, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ir_type_size() {
        assert_eq!(std::mem::size_of::<StringRef>(), 4);
        assert_eq!(std::mem::size_of::<ExprRef>(), 4);
    }

    #[test]
    fn reference_ids() {
        let mut ctx = Context::default();
        let str_id0 = ctx.string("a".into());
        let id0 = ctx.add_expr(Expr::BVSymbol {
            name: str_id0,
            width: 1,
        });
        assert_eq!(id0.index(), 0, "ids start at zero");
        let id0_b = ctx.add_expr(Expr::BVSymbol {
            name: str_id0,
            width: 1,
        });
        assert_eq!(id0, id0_b, "ids should be interned!");
        let id1 = ctx.add_expr(Expr::BVSymbol {
            name: str_id0,
            width: 2,
        });
        assert_eq!(id0.index() + 1, id1.index(), "ids should increment!");
    }

    #[test]
    fn taint_is_never_interned() {
        let mut ctx = Context::default();
        let t0 = ctx.taint(8);
        let t1 = ctx.taint(8);
        assert_ne!(t0, t1);
        let a = ctx.bv_symbol("a", 8);
        assert_eq!(ctx.find_symbol("a", 8), Some(a));
        assert_eq!(ctx.find_symbol("a", 7), None);
        assert_eq!(ctx.find_symbol("b", 8), None);
    }

    #[test]
    fn resize_and_many() {
        let mut ctx = Context::default();
        let a = ctx.bv_symbol("a", 4);
        let wide = ctx.resize(a, 9);
        assert_eq!(wide.get_width(&ctx), 9);
        let narrow = ctx.resize(wide, 4);
        assert_eq!(narrow.get_width(&ctx), 4);
        let tru = ctx.tru();
        assert_eq!(ctx.and_many([]), tru);
        let fals = ctx.fals();
        assert_eq!(ctx.or_many([]), fals);
    }
}
