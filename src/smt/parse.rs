// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use baa::{BitVecOps, BitVecValue, WidthInt};
use easy_smt as smt;

/// Parses a value returned by `get-value`. Accepts the bare value as well as the
/// `((name value))` and `(name value)` wrappers that solvers produce.
pub fn parse_smt_bit_vec(smt_ctx: &smt::Context, expr: smt::SExpr) -> Option<BitVecValue> {
    let data = smt_ctx.get(expr);
    match data {
        smt::SExprData::Atom(value) => smt_bit_vec_str_to_value(value),
        // unwraps expressions like: ((a true))
        smt::SExprData::List([inner]) => parse_smt_bit_vec(smt_ctx, *inner),
        // unwraps expressions like: (a true)
        smt::SExprData::List([_, value]) => parse_smt_bit_vec(smt_ctx, *value),
        // decimal literals like: (_ bv5 4)
        smt::SExprData::List([und, value, width]) => {
            parse_smt_id(smt_ctx, *und, "_")?;
            let value = match smt_ctx.get(*value) {
                smt::SExprData::Atom(v) => v.strip_prefix("bv")?.parse::<u64>().ok()?,
                _ => return None,
            };
            let width: WidthInt = match smt_ctx.get(*width) {
                smt::SExprData::Atom(w) => w.parse().ok()?,
                _ => return None,
            };
            Some(BitVecValue::from_u64(value, width))
        }
        _ => None,
    }
}

fn parse_smt_id(smt_ctx: &smt::Context, expr: smt::SExpr, expected: &str) -> Option<()> {
    match smt_ctx.get(expr) {
        smt::SExprData::Atom(val) if val == expected => Some(()),
        _ => None,
    }
}

fn smt_bit_vec_str_to_value(a: &str) -> Option<BitVecValue> {
    if let Some(suffix) = a.strip_prefix("#b") {
        digits_to_value(suffix, 1)
    } else if let Some(suffix) = a.strip_prefix("#x") {
        digits_to_value(suffix, 4)
    } else if a == "true" {
        Some(BitVecValue::tru())
    } else if a == "false" {
        Some(BitVecValue::fals())
    } else {
        None
    }
}

/// Converts binary (1 bit per digit) or hex (4 bits per digit) strings of arbitrary length.
fn digits_to_value(digits: &str, bits_per_digit: WidthInt) -> Option<BitVecValue> {
    let radix = 1u32 << bits_per_digit;
    let digits_per_chunk = (64 / bits_per_digit) as usize;
    let bytes = digits.as_bytes();
    // the first chunk takes the remainder so that all others are full
    let first = match bytes.len() % digits_per_chunk {
        0 => digits_per_chunk.min(bytes.len()),
        n => n,
    };
    let mut value: Option<BitVecValue> = None;
    let mut start = 0;
    let mut end = first;
    while start < bytes.len() {
        let chunk = std::str::from_utf8(&bytes[start..end]).ok()?;
        let word = u64::from_str_radix(chunk, radix).ok()?;
        let chunk_value = BitVecValue::from_u64(word, chunk.len() as WidthInt * bits_per_digit);
        value = Some(match value {
            None => chunk_value,
            Some(prev) => prev.concat(&chunk_value),
        });
        start = end;
        end += digits_per_chunk;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use easy_smt::*;

    #[test]
    fn test_yices2_result_parsing() {
        // yices will produce responses like this for a `get-value` call:
        // ((n9@0 true))
        let ctx = ContextBuilder::new().build().unwrap();
        let r0 = ctx.list(vec![ctx.list(vec![ctx.atom("n9@0"), ctx.true_()])]);
        let val0 = parse_smt_bit_vec(&ctx, r0).unwrap();
        assert_eq!(val0.to_u64().unwrap(), 1);
        assert_eq!(val0.width(), 1);
        assert!(val0.is_tru());
    }

    #[test]
    fn test_z3_result_parsing() {
        let ctx = ContextBuilder::new().build().unwrap();
        let r0 = ctx.list(vec![ctx.list(vec![ctx.atom("a"), ctx.atom("#x0e")])]);
        let val0 = parse_smt_bit_vec(&ctx, r0).unwrap();
        assert_eq!(val0.to_u64(), Some(14));
        assert_eq!(val0.width(), 8);

        let r1 = ctx.list(vec![ctx.atom("_"), ctx.atom("bv5"), ctx.atom("4")]);
        let val1 = parse_smt_bit_vec(&ctx, r1).unwrap();
        assert_eq!(val1.to_u64(), Some(5));
        assert_eq!(val1.width(), 4);

        assert!(parse_smt_bit_vec(&ctx, ctx.atom("42")).is_none());

        let wide = format!("#b1{}", "0".repeat(69));
        let val2 = parse_smt_bit_vec(&ctx, ctx.atom(wide)).unwrap();
        assert_eq!(val2.width(), 70);
        assert_eq!(val2.slice(69, 69).to_u64(), Some(1));
        assert!(val2.slice(68, 0).is_zero());
    }
}
