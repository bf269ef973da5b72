// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::ir::context::{Context, StringRef};
use std::fmt::{Debug, Formatter};
use std::num::NonZeroU32;

/// This type restricts the maximum width that a bit-vector type is allowed to have in our IR.
pub type WidthInt = u32;

/// This restricts the maximum value that a bit-vector literal can carry.
pub type BVLiteralInt = u64;

#[derive(PartialEq, Eq, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct ExprRef(NonZeroU32);

impl Debug for ExprRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // we need a custom implementation in order to show the zero based index
        write!(f, "ExprRef({})", self.index())
    }
}

impl ExprRef {
    pub(crate) fn from_index(index: usize) -> Self {
        ExprRef(NonZeroU32::new((index + 1) as u32).expect("expression arena overflow"))
    }

    pub(crate) fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
/// Represents a SMT bit-vector expression. Booleans are bit-vectors of width one.
pub enum Expr {
    // nullary
    BVSymbol {
        name: StringRef,
        width: WidthInt,
    },
    BVLiteral {
        value: BVLiteralInt,
        width: WidthInt,
    },
    /// An unconstrained value that stands in for undefined behavior. Every taint leaf carries a
    /// unique id, so two taint leaves are never interned into the same node.
    BVTaint {
        id: u32,
        width: WidthInt,
    },
    // unary operations
    BVZeroExt {
        e: ExprRef,
        by: WidthInt,
        width: WidthInt,
    },
    BVSlice {
        e: ExprRef,
        hi: WidthInt,
        lo: WidthInt,
        // no `width` since it is easy to calculate from `hi` and `lo` without looking at `e`
    },
    BVNot(ExprRef, WidthInt),
    BVNegate(ExprRef, WidthInt),
    // binary operations
    BVEqual(ExprRef, ExprRef),
    BVImplies(ExprRef, ExprRef),
    BVGreater(ExprRef, ExprRef),
    BVGreaterSigned(ExprRef, ExprRef),
    BVGreaterEqual(ExprRef, ExprRef),
    BVConcat(ExprRef, ExprRef, WidthInt),
    // binary arithmetic
    BVAnd(ExprRef, ExprRef, WidthInt),
    BVOr(ExprRef, ExprRef, WidthInt),
    BVXor(ExprRef, ExprRef, WidthInt),
    BVShiftLeft(ExprRef, ExprRef, WidthInt),
    BVShiftRight(ExprRef, ExprRef, WidthInt),
    BVAdd(ExprRef, ExprRef, WidthInt),
    BVMul(ExprRef, ExprRef, WidthInt),
    BVSub(ExprRef, ExprRef, WidthInt),
    // ternary op
    BVIte {
        cond: ExprRef,
        tru: ExprRef,
        fals: ExprRef,
    },
}

impl Expr {
    pub fn is_symbol(&self) -> bool {
        matches!(self, Expr::BVSymbol { .. })
    }

    pub fn is_taint(&self) -> bool {
        matches!(self, Expr::BVTaint { .. })
    }

    pub fn is_bv_lit(&self) -> bool {
        matches!(self, Expr::BVLiteral { .. })
    }

    /// Returns the value of a literal.
    pub fn get_bv_lit(&self) -> Option<BVLiteralInt> {
        match self {
            Expr::BVLiteral { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn get_symbol_name_ref(&self) -> Option<StringRef> {
        match self {
            Expr::BVSymbol { name, .. } => Some(*name),
            _ => None,
        }
    }

    pub fn get_symbol_name<'a>(&self, ctx: &'a Context) -> Option<&'a str> {
        self.get_symbol_name_ref().map(|r| ctx.get_str(r))
    }
}

impl ExprRef {
    pub fn is_symbol(&self, ctx: &Context) -> bool {
        ctx.get(*self).is_symbol()
    }

    pub fn is_bv_lit(&self, ctx: &Context) -> bool {
        ctx.get(*self).is_bv_lit()
    }

    pub fn get_bv_lit(&self, ctx: &Context) -> Option<BVLiteralInt> {
        ctx.get(*self).get_bv_lit()
    }

    /// Returns `Some(true)` or `Some(false)` for boolean literals.
    pub fn get_bool_lit(&self, ctx: &Context) -> Option<bool> {
        match ctx.get(*self) {
            Expr::BVLiteral { value, width: 1 } => Some(*value == 1),
            _ => None,
        }
    }

    pub fn get_symbol_name<'a>(&self, ctx: &'a Context) -> Option<&'a str> {
        ctx.get(*self).get_symbol_name(ctx)
    }
}

pub fn bv_value_fits_width(value: BVLiteralInt, width: WidthInt) -> bool {
    let bits_required = BVLiteralInt::BITS - value.leading_zeros();
    width >= bits_required
}

/// All ones for a bit-vector of up to 64 bits.
pub fn bv_mask_value(width: WidthInt) -> BVLiteralInt {
    debug_assert!(width > 0 && width <= BVLiteralInt::BITS);
    BVLiteralInt::MAX >> (BVLiteralInt::BITS - width)
}
