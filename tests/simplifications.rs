// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use p4testgen::ir::*;

#[test]
fn branch_conditions_on_literals_fold() {
    let mut ctx = Context::default();
    let tru = ctx.tru();
    let fals = ctx.fals();
    let c = ctx.bv_symbol("c", 1);

    let tru_and_fals = ctx.and(tru, fals);
    assert_eq!(simplify_single_expression(&mut ctx, tru_and_fals), fals);
    let fals_or_tru = ctx.or(fals, tru);
    assert_eq!(simplify_single_expression(&mut ctx, fals_or_tru), tru);
    let c_and_tru = ctx.and(c, tru);
    assert_eq!(simplify_single_expression(&mut ctx, c_and_tru), c);
    let c_or_tru = ctx.or(c, tru);
    assert_eq!(simplify_single_expression(&mut ctx, c_or_tru), tru);

    // the else branch of a branch on `not c`
    let not_c = ctx.not(c);
    let not_not_c = ctx.not(not_c);
    assert_eq!(simplify_single_expression(&mut ctx, not_not_c), c);
}

#[test]
fn select_on_constant_key_is_decided() {
    let mut ctx = Context::default();
    let ether_type = ctx.bv_lit(0x0800, 16);
    let ipv4 = ctx.bv_lit(0x0800, 16);
    let ipv6 = ctx.bv_lit(0x86dd, 16);
    let is_ipv4 = ctx.bv_equal(ether_type, ipv4);
    let is_ipv6 = ctx.bv_equal(ether_type, ipv6);
    assert_eq!(
        simplify_single_expression(&mut ctx, is_ipv4).get_bool_lit(&ctx),
        Some(true)
    );
    assert_eq!(
        simplify_single_expression(&mut ctx, is_ipv6).get_bool_lit(&ctx),
        Some(false)
    );

    // second case of a first-match select: `!is_ipv4 && is_ipv6`
    let not_ipv4 = ctx.not(is_ipv4);
    let second = ctx.and(not_ipv4, is_ipv6);
    let fals = ctx.fals();
    assert_eq!(simplify_single_expression(&mut ctx, second), fals);
}

#[test]
fn ite_over_validity() {
    let mut ctx = Context::default();
    let a = ctx.bv_symbol("hdr.h.a", 12);
    let b = ctx.bv_symbol("hdr.h.b", 12);
    let valid = ctx.bv_symbol("hdr.h.$valid", 1);
    let tru = ctx.tru();
    let fals = ctx.fals();

    let same = ctx.bv_ite(valid, a, a);
    assert_eq!(simplify_single_expression(&mut ctx, same), a);
    let decided = ctx.bv_ite(tru, a, b);
    assert_eq!(simplify_single_expression(&mut ctx, decided), a);
    let decided = ctx.bv_ite(fals, a, b);
    assert_eq!(simplify_single_expression(&mut ctx, decided), b);

    let as_bool = ctx.bv_ite(valid, tru, fals);
    assert_eq!(simplify_single_expression(&mut ctx, as_bool), valid);
    let negated = ctx.bv_ite(valid, fals, tru);
    let not_valid = ctx.not(valid);
    assert_eq!(simplify_single_expression(&mut ctx, negated), not_valid);
}

#[test]
fn taint_is_not_folded() {
    let mut ctx = Context::default();
    let t = ctx.taint(8);
    let zero = ctx.zero(8);
    let masked = ctx.and(t, zero);
    // anything and zero is zero, even if it is tainted
    assert_eq!(simplify_single_expression(&mut ctx, masked), zero);
    let sum = ctx.add(t, zero);
    let simplified = simplify_single_expression(&mut ctx, sum);
    assert!(is_tainted(&ctx, simplified));
}
