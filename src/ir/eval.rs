// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::ir::{Context, Expr, ExprRef, ForEachChild};
use baa::{BitVecOps, BitVecValue};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Returns a value for a symbol or taint leaf if it is available.
pub trait GetExprValue {
    fn get_bv(&self, ctx: &Context, symbol: ExprRef) -> Option<BitVecValue>;
}

impl GetExprValue for HashMap<ExprRef, BitVecValue> {
    fn get_bv(&self, _ctx: &Context, symbol: ExprRef) -> Option<BitVecValue> {
        self.get(&symbol).cloned()
    }
}

impl GetExprValue for [(ExprRef, BitVecValue)] {
    fn get_bv(&self, _ctx: &Context, symbol: ExprRef) -> Option<BitVecValue> {
        self.iter()
            .find(|(e, _v)| *e == symbol)
            .map(|(_e, v)| v.clone())
    }
}

type BitVecStack = SmallVec<[BitVecValue; 4]>;

#[inline]
fn un_op(stack: &mut BitVecStack, op: impl Fn(BitVecValue) -> BitVecValue) {
    let e = stack.pop().unwrap_or_else(|| panic!("Stack is empty!"));
    let res = op(e);
    stack.push(res);
}

#[inline]
fn bin_op(stack: &mut BitVecStack, op: impl Fn(BitVecValue, BitVecValue) -> BitVecValue) {
    let a = stack.pop().unwrap_or_else(|| panic!("Stack is empty!"));
    let b = stack.pop().unwrap_or_else(|| panic!("Stack is empty!"));
    let res = op(a, b);
    stack.push(res);
}

/// Evaluates `expr` to a concrete value. All symbols and taint leaves in `expr` must have a
/// value in `values`.
pub fn eval_bv_expr(
    ctx: &Context,
    values: &(impl GetExprValue + ?Sized),
    expr: ExprRef,
) -> BitVecValue {
    let mut stack: BitVecStack = SmallVec::with_capacity(4);
    let mut todo: SmallVec<[(ExprRef, bool); 4]> = SmallVec::with_capacity(4);

    todo.push((expr, false));
    while let Some((e, args_available)) = todo.pop() {
        let expr = ctx.get(e);

        if !args_available {
            if let Some(value) = values.get_bv(ctx, e) {
                stack.push(value);
                continue;
            }
            let mut has_child = false;
            expr.for_each_child(|c| {
                if !has_child {
                    has_child = true;
                    todo.push((e, true));
                }
                todo.push((*c, false));
            });
            if has_child {
                continue;
            }
        }

        // the first argument is always on top of the stack
        match expr {
            Expr::BVSymbol { name, width } => {
                panic!(
                    "No value found for symbol: {} : bv<{width}>",
                    ctx.get_str(*name)
                );
            }
            Expr::BVTaint { id, width } => {
                panic!("No value found for taint #{id} : bv<{width}>");
            }
            Expr::BVLiteral { value, width } => stack.push(BitVecValue::from_u64(*value, *width)),
            Expr::BVZeroExt { by, .. } => un_op(&mut stack, |e| e.zero_extend(*by)),
            Expr::BVSlice { hi, lo, .. } => un_op(&mut stack, |e| e.slice(*hi, *lo)),
            Expr::BVNot(_, _) => un_op(&mut stack, |e| e.not()),
            Expr::BVNegate(_, _) => un_op(&mut stack, |e| e.negate()),
            Expr::BVEqual(_, _) => bin_op(&mut stack, |a, b| a.is_equal(&b).into()),
            Expr::BVImplies(_, _) => bin_op(&mut stack, |a, b| a.not().or(&b)),
            Expr::BVGreater(_, _) => bin_op(&mut stack, |a, b| a.is_greater(&b).into()),
            Expr::BVGreaterSigned(_, _) => {
                bin_op(&mut stack, |a, b| a.is_greater_signed(&b).into())
            }
            Expr::BVGreaterEqual(_, _) => {
                bin_op(&mut stack, |a, b| a.is_greater_or_equal(&b).into())
            }
            Expr::BVConcat(_, _, _) => bin_op(&mut stack, |a, b| a.concat(&b)),
            Expr::BVAnd(_, _, _) => bin_op(&mut stack, |a, b| a.and(&b)),
            Expr::BVOr(_, _, _) => bin_op(&mut stack, |a, b| a.or(&b)),
            Expr::BVXor(_, _, _) => bin_op(&mut stack, |a, b| a.xor(&b)),
            Expr::BVShiftLeft(_, _, _) => bin_op(&mut stack, |a, b| a.shift_left(&b)),
            Expr::BVShiftRight(_, _, _) => bin_op(&mut stack, |a, b| a.shift_right(&b)),
            Expr::BVAdd(_, _, _) => bin_op(&mut stack, |a, b| a.add(&b)),
            Expr::BVMul(_, _, _) => bin_op(&mut stack, |a, b| a.mul(&b)),
            Expr::BVSub(_, _, _) => bin_op(&mut stack, |a, b| a.sub(&b)),
            Expr::BVIte { .. } => {
                let cond = stack
                    .pop()
                    .and_then(|c| c.to_bool())
                    .unwrap_or_else(|| panic!("ite condition is missing"));
                let tru = stack.pop().unwrap_or_else(|| panic!("Stack is empty!"));
                let fals = stack.pop().unwrap_or_else(|| panic!("Stack is empty!"));
                stack.push(if cond { tru } else { fals });
            }
        }
    }

    debug_assert_eq!(stack.len(), 1);
    stack.pop().unwrap_or_else(|| panic!("Stack is empty!"))
}
