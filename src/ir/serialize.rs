// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::ir::{Context, Expr, ExprRef};
use std::io::Write;

pub trait SerializableIrNode {
    fn serialize<W: Write>(&self, ctx: &Context, writer: &mut W) -> std::io::Result<()>;
    fn serialize_to_str(&self, ctx: &Context) -> String {
        let mut buf = Vec::new();
        self.serialize(ctx, &mut buf)
            .expect("Failed to write to string!");
        String::from_utf8(buf).expect("Failed to read string we wrote!")
    }
}

impl SerializableIrNode for Expr {
    fn serialize<W: Write>(&self, ctx: &Context, writer: &mut W) -> std::io::Result<()> {
        serialize_expr(self, ctx, writer)
    }
}

impl SerializableIrNode for ExprRef {
    fn serialize<W: Write>(&self, ctx: &Context, writer: &mut W) -> std::io::Result<()> {
        ctx.get(*self).serialize(ctx, writer)
    }
}

fn call<W: Write>(
    ctx: &Context,
    writer: &mut W,
    name: &str,
    args: &[ExprRef],
) -> std::io::Result<()> {
    write!(writer, "{name}(")?;
    for (ii, arg) in args.iter().enumerate() {
        if ii > 0 {
            write!(writer, ", ")?;
        }
        arg.serialize(ctx, writer)?;
    }
    write!(writer, ")")
}

fn serialize_expr<W: Write>(expr: &Expr, ctx: &Context, writer: &mut W) -> std::io::Result<()> {
    match *expr {
        Expr::BVSymbol { name, .. } => write!(writer, "{}", ctx.get_str(name)),
        Expr::BVLiteral { value, width } => {
            if width <= 8 {
                write!(writer, "{width}'b{value:b}")
            } else {
                write!(writer, "{width}'x{value:x}")
            }
        }
        Expr::BVTaint { id, width } => write!(writer, "taint#{id}<{width}>"),
        Expr::BVZeroExt { e, by, .. } => {
            write!(writer, "zext(")?;
            e.serialize(ctx, writer)?;
            write!(writer, ", {by})")
        }
        Expr::BVSlice { e, hi, lo } => {
            e.serialize(ctx, writer)?;
            if hi == lo {
                write!(writer, "[{hi}]")
            } else {
                write!(writer, "[{hi}:{lo}]")
            }
        }
        Expr::BVNot(e, _) => call(ctx, writer, "not", &[e]),
        Expr::BVNegate(e, _) => call(ctx, writer, "neg", &[e]),
        Expr::BVEqual(a, b) => call(ctx, writer, "eq", &[a, b]),
        Expr::BVImplies(a, b) => call(ctx, writer, "implies", &[a, b]),
        Expr::BVGreater(a, b) => call(ctx, writer, "ugt", &[a, b]),
        Expr::BVGreaterSigned(a, b) => call(ctx, writer, "sgt", &[a, b]),
        Expr::BVGreaterEqual(a, b) => call(ctx, writer, "ugte", &[a, b]),
        Expr::BVConcat(a, b, _) => call(ctx, writer, "concat", &[a, b]),
        Expr::BVAnd(a, b, _) => call(ctx, writer, "and", &[a, b]),
        Expr::BVOr(a, b, _) => call(ctx, writer, "or", &[a, b]),
        Expr::BVXor(a, b, _) => call(ctx, writer, "xor", &[a, b]),
        Expr::BVShiftLeft(a, b, _) => call(ctx, writer, "logical_shift_left", &[a, b]),
        Expr::BVShiftRight(a, b, _) => call(ctx, writer, "logical_shift_right", &[a, b]),
        Expr::BVAdd(a, b, _) => call(ctx, writer, "add", &[a, b]),
        Expr::BVMul(a, b, _) => call(ctx, writer, "mul", &[a, b]),
        Expr::BVSub(a, b, _) => call(ctx, writer, "sub", &[a, b]),
        Expr::BVIte { cond, tru, fals } => call(ctx, writer, "ite", &[cond, tru, fals]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_serialization() {
        let mut ctx = Context::default();
        let test_expr = ctx.bv_symbol("test", 3);
        assert_eq!("test", test_expr.serialize_to_str(&ctx));
        let a = ctx.bv_symbol("a", 4);
        let b = ctx.bv_symbol("b", 4);
        let fifteen = ctx.bv_lit(15, 4);
        let sum = ctx.add(a, fifteen);
        let cond = ctx.less(sum, b);
        insta::assert_snapshot!(cond.serialize_to_str(&ctx), @"ugt(b, add(a, 4'b1111))");
        let wide = ctx.bv_lit(0x1ff, 9);
        let slice = ctx.slice(wide, 3, 3);
        insta::assert_snapshot!(slice.serialize_to_str(&ctx), @"9'x1ff[3]");
    }
}
