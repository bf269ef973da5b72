// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::ir::traversal::bottom_up;
use crate::ir::{Context, Expr, ExprRef, TypeCheck, WidthInt};
use baa::{BitVecOps, BitVecValue};

fn ones(width: WidthInt) -> BitVecValue {
    BitVecValue::zero(width).not()
}

/// Computes which bits of `expr` may be influenced by a taint leaf. A set bit in the result
/// means that the corresponding bit of `expr` is undefined.
pub fn taint_mask(ctx: &Context, expr: ExprRef) -> BitVecValue {
    bottom_up(ctx, expr, |ctx, e, node, masks: &[BitVecValue]| {
        let width = e.get_width(ctx);
        match *node {
            Expr::BVTaint { .. } => ones(width),
            Expr::BVSymbol { .. } | Expr::BVLiteral { .. } => BitVecValue::zero(width),
            Expr::BVConcat(..) => masks[0].concat(&masks[1]),
            Expr::BVSlice { hi, lo, .. } => masks[0].slice(hi, lo),
            Expr::BVZeroExt { by, .. } => masks[0].zero_extend(by),
            Expr::BVNot(..) => masks[0].clone(),
            Expr::BVIte { .. } if masks[0].is_zero() => masks[1].or(&masks[2]),
            _ => {
                if masks.iter().all(|m| m.is_zero()) {
                    BitVecValue::zero(width)
                } else {
                    ones(width)
                }
            }
        }
    })
}

/// Returns true iff any bit of `expr` depends on a taint leaf.
pub fn is_tainted(ctx: &Context, expr: ExprRef) -> bool {
    crate::ir::traversal::collect_leaves(ctx, [expr])
        .into_iter()
        .any(|e| ctx.get(e).is_taint())
}
