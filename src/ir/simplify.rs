// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::ir::eval::eval_bv_expr;
use crate::ir::expr::bv_mask_value;
use crate::ir::*;
use baa::BitVecOps;
use std::collections::HashMap;

/// Folds constant sub-expressions and applies boolean identities.
/// The result is semantically equivalent to `expr`.
pub fn simplify_single_expression(ctx: &mut Context, expr: ExprRef) -> ExprRef {
    let mut transformed: HashMap<ExprRef, ExprRef> = HashMap::new();
    let mut todo = vec![expr];
    let mut children = Vec::with_capacity(3);

    while let Some(expr_ref) = todo.pop() {
        if transformed.contains_key(&expr_ref) {
            continue;
        }
        children.clear();
        let mut all_transformed = true;
        ctx.get(expr_ref).for_each_child(|c| match transformed.get(c) {
            Some(new_child) => children.push(*new_child),
            None => {
                if all_transformed {
                    todo.push(expr_ref);
                }
                all_transformed = false;
                todo.push(*c);
            }
        });
        if !all_transformed {
            continue;
        }
        let rebuilt = update_expr_children(ctx, expr_ref, &children);
        let simplified = simplify(ctx, rebuilt);
        transformed.insert(expr_ref, simplified);
    }
    transformed[&expr]
}

fn update_expr_children(ctx: &mut Context, expr_ref: ExprRef, children: &[ExprRef]) -> ExprRef {
    let expr = *ctx.get(expr_ref);
    let new_expr = match (expr, children) {
        (Expr::BVZeroExt { by, width, .. }, [e]) => Expr::BVZeroExt { e: *e, by, width },
        (Expr::BVSlice { hi, lo, .. }, [e]) => Expr::BVSlice { e: *e, hi, lo },
        (Expr::BVNot(_, w), [e]) => Expr::BVNot(*e, w),
        (Expr::BVNegate(_, w), [e]) => Expr::BVNegate(*e, w),
        (Expr::BVEqual(..), [a, b]) => Expr::BVEqual(*a, *b),
        (Expr::BVImplies(..), [a, b]) => Expr::BVImplies(*a, *b),
        (Expr::BVGreater(..), [a, b]) => Expr::BVGreater(*a, *b),
        (Expr::BVGreaterSigned(..), [a, b]) => Expr::BVGreaterSigned(*a, *b),
        (Expr::BVGreaterEqual(..), [a, b]) => Expr::BVGreaterEqual(*a, *b),
        (Expr::BVConcat(_, _, w), [a, b]) => Expr::BVConcat(*a, *b, w),
        (Expr::BVAnd(_, _, w), [a, b]) => Expr::BVAnd(*a, *b, w),
        (Expr::BVOr(_, _, w), [a, b]) => Expr::BVOr(*a, *b, w),
        (Expr::BVXor(_, _, w), [a, b]) => Expr::BVXor(*a, *b, w),
        (Expr::BVShiftLeft(_, _, w), [a, b]) => Expr::BVShiftLeft(*a, *b, w),
        (Expr::BVShiftRight(_, _, w), [a, b]) => Expr::BVShiftRight(*a, *b, w),
        (Expr::BVAdd(_, _, w), [a, b]) => Expr::BVAdd(*a, *b, w),
        (Expr::BVMul(_, _, w), [a, b]) => Expr::BVMul(*a, *b, w),
        (Expr::BVSub(_, _, w), [a, b]) => Expr::BVSub(*a, *b, w),
        (Expr::BVIte { .. }, [cond, tru, fals]) => Expr::BVIte {
            cond: *cond,
            tru: *tru,
            fals: *fals,
        },
        (leaf, []) => return ctx.add_expr(leaf),
        (other, _) => unreachable!("wrong number of children for {other:?}"),
    };
    ctx.add_expr(new_expr)
}

/// Simplifies a node whose children are already simplified.
fn simplify(ctx: &mut Context, expr_ref: ExprRef) -> ExprRef {
    let expr = *ctx.get(expr_ref);
    if let Some(folded) = fold_constant(ctx, expr_ref, &expr) {
        return folded;
    }
    match expr {
        Expr::BVNot(inner, _) => {
            if let Expr::BVNot(e, _) = ctx.get(inner) {
                return *e;
            }
        }
        Expr::BVEqual(a, b) if a == b => return ctx.tru(),
        Expr::BVImplies(a, b) => match (a.get_bv_lit(ctx), b.get_bv_lit(ctx)) {
            (Some(0), _) | (_, Some(1)) => return ctx.tru(),
            (Some(1), _) => return b,
            (_, Some(0)) => return ctx.not(a),
            _ if a == b => return ctx.tru(),
            _ => {}
        },
        Expr::BVAnd(a, b, w) => {
            let mask = bv_mask_value(w.min(64));
            match (a.get_bv_lit(ctx), b.get_bv_lit(ctx)) {
                (Some(0), _) => return a,
                (_, Some(0)) => return b,
                (Some(v), _) if w <= 64 && v == mask => return b,
                (_, Some(v)) if w <= 64 && v == mask => return a,
                _ if a == b => return a,
                _ => {}
            }
        }
        Expr::BVOr(a, b, w) => {
            let mask = bv_mask_value(w.min(64));
            match (a.get_bv_lit(ctx), b.get_bv_lit(ctx)) {
                (Some(0), _) => return b,
                (_, Some(0)) => return a,
                (Some(v), _) if w <= 64 && v == mask => return a,
                (_, Some(v)) if w <= 64 && v == mask => return b,
                _ if a == b => return a,
                _ => {}
            }
        }
        Expr::BVIte { cond, tru, fals } => {
            if tru == fals {
                return tru;
            }
            match cond.get_bv_lit(ctx) {
                Some(1) => return tru,
                Some(0) => return fals,
                _ => {}
            }
            if tru.get_width(ctx) == 1 {
                match (tru.get_bv_lit(ctx), fals.get_bv_lit(ctx)) {
                    (Some(1), Some(0)) => return cond,
                    (Some(0), Some(1)) => return ctx.not(cond),
                    (Some(1), None) => return ctx.or(cond, fals),
                    (None, Some(0)) => return ctx.and(cond, tru),
                    _ => {}
                }
            }
        }
        _ => {}
    }
    expr_ref
}

/// Evaluates nodes whose children are all literals.
fn fold_constant(ctx: &mut Context, expr_ref: ExprRef, expr: &Expr) -> Option<ExprRef> {
    if expr.num_children() == 0 {
        return None;
    }
    let mut all_lit = true;
    expr.for_each_child(|c| all_lit &= ctx.get(*c).is_bv_lit());
    let width = expr.get_width(ctx);
    if !all_lit || width > 64 {
        return None;
    }
    let no_symbols: [(ExprRef, baa::BitVecValue); 0] = [];
    let value = eval_bv_expr(ctx, no_symbols.as_slice(), expr_ref).to_u64()?;
    Some(ctx.bv_lit(value, width))
}
