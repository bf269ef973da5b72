// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::ir::*;
use easy_smt as smt;
use std::borrow::Cow;

/// Name of the SMT constant that represents a taint leaf.
pub fn taint_smt_name(id: u32) -> String {
    format!("__taint_{id}")
}

/// 1-bit values are represented as `Bool` in SMT.
pub fn convert_tpe(smt_ctx: &smt::Context, width: WidthInt) -> smt::SExpr {
    match width {
        1 => smt_ctx.bool_sort(),
        width => smt_ctx.bit_vec_sort(smt_ctx.numeral(width)),
    }
}

/// Name under which a symbol or taint leaf is declared in SMT.
pub fn leaf_smt_name<'a>(ctx: &'a Context, leaf: ExprRef) -> Cow<'a, str> {
    match ctx.get(leaf) {
        Expr::BVSymbol { name, .. } => escape_smt_identifier(ctx.get_str(*name)),
        Expr::BVTaint { id, .. } => Cow::Owned(taint_smt_name(*id)),
        other => panic!("{other:?} is not a leaf"),
    }
}

pub fn convert_expr(smt_ctx: &smt::Context, ctx: &Context, expr_ref: ExprRef) -> smt::SExpr {
    match ctx.get(expr_ref) {
        Expr::BVSymbol { .. } | Expr::BVTaint { .. } => {
            smt_ctx.atom(leaf_smt_name(ctx, expr_ref))
        }
        Expr::BVLiteral { value, width: 1 } => {
            if *value == 1 {
                smt_ctx.true_()
            } else {
                smt_ctx.false_()
            }
        }
        Expr::BVLiteral { value, width } => {
            let width = *width as usize;
            smt_ctx.atom(format!("#b{value:0width$b}"))
        }
        Expr::BVZeroExt { e, by, .. } => {
            let e_expr = convert_expr(smt_ctx, ctx, *e);
            if e.get_width(ctx) == 1 {
                // this encoding avoids the zext by using an ite on the expanded true/false case
                let res_size = (by + 1) as usize;
                smt_ctx.ite(
                    e_expr,
                    smt_ctx.binary(res_size, 1),
                    smt_ctx.binary(res_size, 0),
                )
            } else {
                zext(smt_ctx, e_expr, *by as usize)
            }
        }
        Expr::BVSlice { e, hi, lo } => {
            let e_expr = convert_expr(smt_ctx, ctx, *e);
            // skip no-op bit extracts (this helps us avoid slices on boolean values)
            if *lo == 0 && e.get_width(ctx) - 1 == *hi {
                e_expr
            } else {
                let extracted = smt_ctx.extract(*hi as i32, *lo as i32, e_expr);
                if hi > lo {
                    extracted
                } else {
                    to_bool(smt_ctx, extracted)
                }
            }
        }
        Expr::BVNot(e_ref, _) => {
            let e = convert_expr(smt_ctx, ctx, *e_ref);
            if e_ref.is_bool(ctx) {
                smt_ctx.not(e)
            } else {
                smt_ctx.bvnot(e)
            }
        }
        Expr::BVNegate(e_ref, _) => {
            let e = ensure_bit_vec(smt_ctx, ctx, *e_ref, convert_expr(smt_ctx, ctx, *e_ref));
            let res = smt_ctx.bvneg(e);
            if e_ref.is_bool(ctx) {
                to_bool(smt_ctx, res)
            } else {
                res
            }
        }
        Expr::BVEqual(a_ref, b_ref) => {
            let a = convert_expr(smt_ctx, ctx, *a_ref);
            let b = convert_expr(smt_ctx, ctx, *b_ref);
            smt_ctx.eq(a, b)
        }
        Expr::BVImplies(a_ref, b_ref) => {
            let a = convert_expr(smt_ctx, ctx, *a_ref);
            let b = convert_expr(smt_ctx, ctx, *b_ref);
            smt_ctx.imp(a, b)
        }
        Expr::BVGreater(a_ref, b_ref) => {
            convert_simple_binop(true, smt_ctx, ctx, "bvugt", a_ref, b_ref)
        }
        Expr::BVGreaterSigned(a_ref, b_ref) => {
            convert_simple_binop(true, smt_ctx, ctx, "bvsgt", a_ref, b_ref)
        }
        Expr::BVGreaterEqual(a_ref, b_ref) => {
            convert_simple_binop(true, smt_ctx, ctx, "bvuge", a_ref, b_ref)
        }
        Expr::BVConcat(a_ref, b_ref, _) => {
            convert_simple_binop(true, smt_ctx, ctx, "concat", a_ref, b_ref)
        }
        Expr::BVAnd(a_ref, b_ref, _) => {
            let a = convert_expr(smt_ctx, ctx, *a_ref);
            let b = convert_expr(smt_ctx, ctx, *b_ref);
            if a_ref.is_bool(ctx) {
                smt_ctx.and(a, b)
            } else {
                smt_ctx.bvand(a, b)
            }
        }
        Expr::BVOr(a_ref, b_ref, _) => {
            let a = convert_expr(smt_ctx, ctx, *a_ref);
            let b = convert_expr(smt_ctx, ctx, *b_ref);
            if a_ref.is_bool(ctx) {
                smt_ctx.or(a, b)
            } else {
                smt_ctx.bvor(a, b)
            }
        }
        Expr::BVXor(a_ref, b_ref, _) => {
            let a = convert_expr(smt_ctx, ctx, *a_ref);
            let b = convert_expr(smt_ctx, ctx, *b_ref);
            if a_ref.is_bool(ctx) {
                smt_ctx.xor(a, b)
            } else {
                smt_ctx.bvxor(a, b)
            }
        }
        Expr::BVShiftLeft(a_ref, b_ref, _) => {
            convert_simple_binop(false, smt_ctx, ctx, "bvshl", a_ref, b_ref)
        }
        Expr::BVShiftRight(a_ref, b_ref, _) => {
            convert_simple_binop(false, smt_ctx, ctx, "bvlshr", a_ref, b_ref)
        }
        Expr::BVAdd(a_ref, b_ref, _) => {
            convert_simple_binop(false, smt_ctx, ctx, "bvadd", a_ref, b_ref)
        }
        Expr::BVMul(a_ref, b_ref, _) => {
            convert_simple_binop(false, smt_ctx, ctx, "bvmul", a_ref, b_ref)
        }
        Expr::BVSub(a_ref, b_ref, _) => {
            convert_simple_binop(false, smt_ctx, ctx, "bvsub", a_ref, b_ref)
        }
        Expr::BVIte { cond, tru, fals } => {
            let c = convert_expr(smt_ctx, ctx, *cond);
            let t = convert_expr(smt_ctx, ctx, *tru);
            let f = convert_expr(smt_ctx, ctx, *fals);
            smt_ctx.ite(c, t, f)
        }
    }
}

/// for all bin ops that require a conversion to bit-vec from bool
fn convert_simple_binop(
    do_not_convert_to_bool: bool,
    smt_ctx: &smt::Context,
    ctx: &Context,
    op: &str,
    a_ref: &ExprRef,
    b_ref: &ExprRef,
) -> smt::SExpr {
    let a = ensure_bit_vec(smt_ctx, ctx, *a_ref, convert_expr(smt_ctx, ctx, *a_ref));
    let b = ensure_bit_vec(smt_ctx, ctx, *b_ref, convert_expr(smt_ctx, ctx, *b_ref));
    let res = smt_ctx.list(vec![smt_ctx.atom(op), a, b]);
    if !do_not_convert_to_bool && a_ref.is_bool(ctx) {
        to_bool(smt_ctx, res)
    } else {
        res
    }
}

// adds a cast if the underlying value is 1-bit and thus represented as a Bool in SMT
fn ensure_bit_vec(
    smt_ctx: &smt::Context,
    ctx: &Context,
    e_ref: ExprRef,
    e: smt::SExpr,
) -> smt::SExpr {
    if e_ref.is_bool(ctx) {
        smt_ctx.ite(e, smt_ctx.binary(1, 1), smt_ctx.binary(1, 0))
    } else {
        e
    }
}

fn to_bool(smt_ctx: &smt::Context, e: smt::SExpr) -> smt::SExpr {
    smt_ctx.eq(e, smt_ctx.binary(1, 1))
}

/// See <simple_symbol> definition in the Concrete Syntax Appendix of the SMTLib Spec
fn is_simple_smt_identifier(id: &str) -> bool {
    if id.is_empty() {
        return false; // needs to be non-empty
    }
    let mut is_first = true;
    for cc in id.chars() {
        if !cc.is_ascii() {
            return false; // all allowed characters are ASCII characters
        }
        let ac = cc as u8;
        let is_alpha = ac.is_ascii_uppercase() || ac.is_ascii_lowercase();
        let is_num = ac.is_ascii_digit();
        let is_other_allowed_char = matches!(
            ac,
            b'+' | b'-'
                | b'/'
                | b'*'
                | b'='
                | b'%'
                | b'?'
                | b'!'
                | b'.'
                | b'$'
                | b'_'
                | b'~'
                | b'&'
                | b'^'
                | b'<'
                | b'>'
                | b'@'
        );
        if !(is_alpha | is_num | is_other_allowed_char) {
            return false;
        }
        if is_num && is_first {
            return false; // the first character is not allowed ot be a digit
        }
        is_first = false;
    }
    true // passed all checks
}

pub fn escape_smt_identifier(id: &str) -> std::borrow::Cow<'_, str> {
    if is_simple_smt_identifier(id) {
        Cow::Borrowed(id)
    } else {
        let escaped = format!("|{}|", id);
        Cow::Owned(escaped)
    }
}

#[cfg(test)]
fn unescape_smt_identifier(id: &str) -> &str {
    if id.starts_with("|") {
        assert!(id.ends_with("|"));
        &id[1..id.len() - 1]
    } else {
        id
    }
}

/// Zero extend a bit-vector.
fn zext(smt_ctx: &smt::Context, e: smt::SExpr, by: usize) -> smt::SExpr {
    smt_ctx.list(vec![
        smt_ctx.list(vec![
            smt_ctx.atoms().und,
            smt_ctx.atom("zero_extend"),
            smt_ctx.numeral(by),
        ]),
        e,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use easy_smt::*;

    #[test]
    fn easy_smt_symbol_escaping() {
        let ctx = ContextBuilder::new().build().unwrap();
        let test = ctx.atom("test");
        assert_eq!(ctx.display(test).to_string(), "test");
        // turns out easy_smt does not do any escaping!
        let needs_to_be_escaped_1 = ctx.atom("a b");
        assert_eq!(ctx.display(needs_to_be_escaped_1).to_string(), "a b");
    }

    #[test]
    fn boolean_encoding() {
        let smt_ctx = ContextBuilder::new().build().unwrap();
        let mut ctx = crate::ir::Context::default();
        let a = ctx.bv_symbol("a", 4);
        let b = ctx.bv_symbol("hdr.$valid", 1);
        let fifteen = ctx.bv_lit(15, 4);
        let sum = ctx.add(a, fifteen);
        let cond = ctx.less(sum, a);
        let both = ctx.and(cond, b);
        let t = ctx.taint(1);
        let taint_or = ctx.or(both, t);
        let serialized = smt_ctx.display(convert_expr(&smt_ctx, &ctx, taint_or)).to_string();
        assert_eq!(
            serialized,
            "(or (and (bvugt a (bvadd a #b1111)) hdr.$valid) __taint_0)"
        );
    }

    #[test]
    fn test_our_escaping() {
        assert_eq!(
            unescape_smt_identifier(&escape_smt_identifier("a b")),
            "a b"
        );
    }
}
