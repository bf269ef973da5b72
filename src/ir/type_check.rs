// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::ir::{Context, Expr, ExprRef, WidthInt};

#[derive(Debug, Clone)]
pub struct TypeCheckError {
    msg: String,
}

impl TypeCheckError {
    pub fn get_msg(&self) -> &str {
        &self.msg
    }
}

impl std::fmt::Display for TypeCheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.msg)
    }
}

fn expect_width(ctx: &Context, e: ExprRef, expected: WidthInt, op: &str) -> Result<WidthInt, TypeCheckError> {
    let width = e.get_width(ctx);
    if width == expected {
        Ok(width)
    } else {
        Err(TypeCheckError {
            msg: format!("{op} only works on bit-vectors of size {expected}, not {width}."),
        })
    }
}

fn expect_same_width_bvs(
    ctx: &Context,
    op: &str,
    a: ExprRef,
    b: ExprRef,
) -> Result<WidthInt, TypeCheckError> {
    let a_width = a.get_width(ctx);
    let b_width = b.get_width(ctx);
    if a_width == b_width {
        Ok(a_width)
    } else {
        Err(TypeCheckError {
            msg: format!(
                "{op} requires two bit-vectors of the same width, not {a_width} and {b_width}"
            ),
        })
    }
}

fn expect_same_width_bvs_of(
    ctx: &Context,
    expected: WidthInt,
    op: &str,
    a: ExprRef,
    b: ExprRef,
) -> Result<WidthInt, TypeCheckError> {
    let width = expect_same_width_bvs(ctx, op, a, b)?;
    if width == expected {
        Ok(width)
    } else {
        Err(TypeCheckError {
            msg: format!("{op} result is declared as {expected} bits, but operands have {width}"),
        })
    }
}

pub trait TypeCheck {
    /// Type check expression node. Does not recurse to lower nodes.
    fn type_check(&self, ctx: &Context) -> Result<WidthInt, TypeCheckError>;
    /// gets the width as fast as possible without performing any checks
    fn get_width(&self, ctx: &Context) -> WidthInt;
    fn is_bool(&self, ctx: &Context) -> bool {
        self.get_width(ctx) == 1
    }
}

impl TypeCheck for Expr {
    fn type_check(&self, ctx: &Context) -> Result<WidthInt, TypeCheckError> {
        match *self {
            Expr::BVSymbol { width, .. } => Ok(width),
            Expr::BVLiteral { width, .. } => Ok(width),
            Expr::BVTaint { width, .. } => Ok(width),
            Expr::BVZeroExt { e, by, width } => {
                expect_width(ctx, e, width - by, "zero extend")?;
                Ok(width)
            }
            Expr::BVSlice { e, hi, lo } => {
                let e_width = e.get_width(ctx);
                if hi >= e_width {
                    Err(TypeCheckError {
                        msg: format!("Bit-slice upper index must be smaller than the width {e_width}. Not: {hi}"),
                    })
                } else if hi < lo {
                    Err(TypeCheckError {
                        msg: format!("Bit-slice upper index must be larger or the same as the lower index. But {hi} < {lo}"),
                    })
                } else {
                    Ok(hi - lo + 1)
                }
            }
            Expr::BVNot(e, width) => expect_width(ctx, e, width, "not"),
            Expr::BVNegate(e, width) => expect_width(ctx, e, width, "negate"),
            Expr::BVEqual(a, b) => {
                expect_same_width_bvs(ctx, "bit-vector equality", a, b)?;
                Ok(1)
            }
            Expr::BVImplies(a, b) => {
                expect_same_width_bvs_of(ctx, 1, "implies", a, b)?;
                Ok(1)
            }
            Expr::BVGreater(a, b) => {
                expect_same_width_bvs(ctx, "greater", a, b)?;
                Ok(1)
            }
            Expr::BVGreaterSigned(a, b) => {
                expect_same_width_bvs(ctx, "greater signed", a, b)?;
                Ok(1)
            }
            Expr::BVGreaterEqual(a, b) => {
                expect_same_width_bvs(ctx, "greater or equals", a, b)?;
                Ok(1)
            }
            Expr::BVConcat(a, b, width) => {
                let sum = a.get_width(ctx) + b.get_width(ctx);
                if sum == width {
                    Ok(width)
                } else {
                    Err(TypeCheckError {
                        msg: format!("concat of {sum} bits declared as {width} bits"),
                    })
                }
            }
            Expr::BVAnd(a, b, w) => expect_same_width_bvs_of(ctx, w, "and", a, b),
            Expr::BVOr(a, b, w) => expect_same_width_bvs_of(ctx, w, "or", a, b),
            Expr::BVXor(a, b, w) => expect_same_width_bvs_of(ctx, w, "xor", a, b),
            Expr::BVShiftLeft(a, b, w) => expect_same_width_bvs_of(ctx, w, "shift left", a, b),
            Expr::BVShiftRight(a, b, w) => expect_same_width_bvs_of(ctx, w, "shift right", a, b),
            Expr::BVAdd(a, b, w) => expect_same_width_bvs_of(ctx, w, "add", a, b),
            Expr::BVMul(a, b, w) => expect_same_width_bvs_of(ctx, w, "mul", a, b),
            Expr::BVSub(a, b, w) => expect_same_width_bvs_of(ctx, w, "sub", a, b),
            Expr::BVIte { cond, tru, fals } => {
                expect_width(ctx, cond, 1, "ite condition")?;
                expect_same_width_bvs(ctx, "ite branches", tru, fals)
            }
        }
    }

    fn get_width(&self, ctx: &Context) -> WidthInt {
        match *self {
            Expr::BVSymbol { width, .. } => width,
            Expr::BVLiteral { width, .. } => width,
            Expr::BVTaint { width, .. } => width,
            Expr::BVZeroExt { width, .. } => width,
            Expr::BVSlice { hi, lo, .. } => hi - lo + 1,
            Expr::BVNot(_, width) => width,
            Expr::BVNegate(_, width) => width,
            Expr::BVEqual(..) => 1,
            Expr::BVImplies(..) => 1,
            Expr::BVGreater(..) => 1,
            Expr::BVGreaterSigned(..) => 1,
            Expr::BVGreaterEqual(..) => 1,
            Expr::BVConcat(_, _, width) => width,
            Expr::BVAnd(_, _, width) => width,
            Expr::BVOr(_, _, width) => width,
            Expr::BVXor(_, _, width) => width,
            Expr::BVShiftLeft(_, _, width) => width,
            Expr::BVShiftRight(_, _, width) => width,
            Expr::BVAdd(_, _, width) => width,
            Expr::BVMul(_, _, width) => width,
            Expr::BVSub(_, _, width) => width,
            Expr::BVIte { tru, .. } => tru.get_width(ctx),
        }
    }
}

impl TypeCheck for ExprRef {
    fn type_check(&self, ctx: &Context) -> Result<WidthInt, TypeCheckError> {
        ctx.get(*self).type_check(ctx)
    }

    fn get_width(&self, ctx: &Context) -> WidthInt {
        ctx.get(*self).get_width(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_check_catches_width_mismatch() {
        let mut ctx = Context::default();
        let a = ctx.bv_symbol("a", 4);
        let b = ctx.bv_symbol("b", 8);
        let bad = ctx.add(a, b);
        let err = bad.type_check(&ctx).unwrap_err();
        assert!(err.get_msg().contains("add"), "{}", err.get_msg());

        let c = ctx.bv_symbol("c", 4);
        let good = ctx.add(a, c);
        assert_eq!(good.type_check(&ctx).unwrap(), 4);
        let cmp = ctx.less(a, c);
        assert!(cmp.is_bool(&ctx));
        let cat = ctx.concat(a, b);
        assert_eq!(cat.type_check(&ctx).unwrap(), 12);
    }
}
