// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Turns front-end expressions into formulas over the current store.

use crate::exec::state::ExecutionState;
use crate::ir::{simplify_single_expression, vars, Context, ExprRef, TypeCheck};
use crate::program::{BinOp, PExpr, Program, UnOp, ERROR_WIDTH};

pub fn lower(ctx: &mut Context, program: &Program, state: &ExecutionState, expr: &PExpr) -> ExprRef {
    let raw = lower_rec(ctx, program, state, expr);
    simplify_single_expression(ctx, raw)
}

fn lower_rec(ctx: &mut Context, program: &Program, state: &ExecutionState, expr: &PExpr) -> ExprRef {
    match expr {
        PExpr::Path(path) => state.get(&state.resolve(path)),
        PExpr::Const { value, width } => ctx.bv_lit(*value, *width),
        PExpr::Bool(value) => ctx.bool_lit(*value),
        PExpr::Unary(op, e) => {
            let e = lower_rec(ctx, program, state, e);
            match op {
                UnOp::Not | UnOp::BitNot => ctx.not(e),
                UnOp::Neg => ctx.negate(e),
            }
        }
        PExpr::Binary(op, a, b) => {
            let a = lower_rec(ctx, program, state, a);
            let b = lower_rec(ctx, program, state, b);
            lower_binop(ctx, *op, a, b)
        }
        PExpr::Slice { e, hi, lo } => {
            let e = lower_rec(ctx, program, state, e);
            ctx.slice(e, *hi, *lo)
        }
        PExpr::Concat(a, b) => {
            let a = lower_rec(ctx, program, state, a);
            let b = lower_rec(ctx, program, state, b);
            ctx.concat(a, b)
        }
        PExpr::IsValid(header) => state.get(&vars::validity_name(&state.resolve(header))),
        PExpr::TableHit(table) => state.get(&vars::table_hit_name(table)),
        PExpr::ErrorConst(name) => ctx.bv_lit(program.error_code(name), ERROR_WIDTH),
    }
}

fn lower_binop(ctx: &mut Context, op: BinOp, a: ExprRef, b: ExprRef) -> ExprRef {
    match op {
        BinOp::Add => ctx.add(a, b),
        BinOp::Sub => ctx.sub(a, b),
        BinOp::Mul => ctx.mul(a, b),
        // the shift amount may be wider than the shifted value, in which case the value
        // is shifted at the width of the amount and truncated afterwards
        BinOp::Shl | BinOp::Shr => {
            let width = a.get_width(ctx);
            let amount_width = b.get_width(ctx);
            let (a, b) = if amount_width > width {
                (ctx.zero_extend(a, amount_width - width), b)
            } else {
                (a, ctx.resize(b, width))
            };
            let shifted = if op == BinOp::Shl {
                ctx.shift_left(a, b)
            } else {
                ctx.shift_right(a, b)
            };
            ctx.resize(shifted, width)
        }
        BinOp::BitAnd | BinOp::And => ctx.and(a, b),
        BinOp::BitOr | BinOp::Or => ctx.or(a, b),
        BinOp::BitXor => ctx.xor(a, b),
        BinOp::Eq => ctx.bv_equal(a, b),
        BinOp::Neq => {
            let eq = ctx.bv_equal(a, b);
            ctx.not(eq)
        }
        BinOp::Lt => ctx.less(a, b),
        BinOp::Le => ctx.less_or_equal(a, b),
        BinOp::Gt => ctx.greater(a, b),
        BinOp::Ge => ctx.greater_or_equal(a, b),
    }
}
