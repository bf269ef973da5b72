// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::ir::{collect_leaves, eval_bv_expr, Context, ExprRef, GetExprValue, TypeCheck, WidthInt};
use baa::{BitVecOps, BitVecValue};
use indexmap::IndexMap;
use rand::RngCore;

/// A concrete assignment to the symbols and taint leaves of a constraint set.
///
/// Taint leaves are kept apart from symbols: they are solver artifacts and do not count
/// towards [`Model::len`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    symbols: IndexMap<ExprRef, BitVecValue>,
    taints: IndexMap<ExprRef, BitVecValue>,
}

impl Model {
    pub fn insert(&mut self, ctx: &Context, leaf: ExprRef, value: BitVecValue) {
        debug_assert_eq!(leaf.get_width(ctx), value.width());
        if ctx.get(leaf).is_taint() {
            self.taints.insert(leaf, value);
        } else {
            debug_assert!(leaf.is_symbol(ctx), "not a leaf: {:?}", ctx.get(leaf));
            self.symbols.insert(leaf, value);
        }
    }

    /// Number of symbols with a value.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, leaf: ExprRef) -> Option<&BitVecValue> {
        self.symbols.get(&leaf).or_else(|| self.taints.get(&leaf))
    }

    pub fn get_by_name(&self, ctx: &Context, name: &str) -> Option<&BitVecValue> {
        self.symbols
            .iter()
            .find(|(sym, _)| sym.get_symbol_name(ctx) == Some(name))
            .map(|(_, value)| value)
    }

    pub fn symbols(&self) -> impl Iterator<Item = (ExprRef, &BitVecValue)> {
        self.symbols.iter().map(|(k, v)| (*k, v))
    }

    pub fn taints(&self) -> impl Iterator<Item = (ExprRef, &BitVecValue)> {
        self.taints.iter().map(|(k, v)| (*k, v))
    }

    /// Assigns a value to every leaf of `exprs` that does not have one yet.
    /// Without a random number generator, missing leaves become zero.
    pub fn complete(
        &mut self,
        ctx: &Context,
        exprs: impl IntoIterator<Item = ExprRef>,
        mut rng: Option<&mut dyn RngCore>,
    ) {
        for leaf in collect_leaves(ctx, exprs) {
            if self.get(leaf).is_some() {
                continue;
            }
            let width = leaf.get_width(ctx);
            let value = match rng.as_deref_mut() {
                Some(rng) => random_bit_vec(rng, width),
                None => BitVecValue::zero(width),
            };
            self.insert(ctx, leaf, value);
        }
    }

    /// Evaluates `expr` under this model. Every leaf of `expr` needs to have a value,
    /// call [`Model::complete`] first if in doubt.
    pub fn evaluate(&self, ctx: &Context, expr: ExprRef) -> BitVecValue {
        eval_bv_expr(ctx, self, expr)
    }
}

impl GetExprValue for Model {
    fn get_bv(&self, _ctx: &Context, symbol: ExprRef) -> Option<BitVecValue> {
        self.get(symbol).cloned()
    }
}

pub(crate) fn random_bit_vec(rng: &mut dyn RngCore, width: WidthInt) -> BitVecValue {
    let mut remaining = width;
    let mut value: Option<BitVecValue> = None;
    while remaining > 0 {
        let chunk = remaining.min(64);
        let word = rng.next_u64() & crate::ir::bv_mask_value(chunk);
        let chunk_value = BitVecValue::from_u64(word, chunk);
        value = Some(match value {
            None => chunk_value,
            Some(prev) => prev.concat(&chunk_value),
        });
        remaining -= chunk;
    }
    value.unwrap_or_else(|| panic!("0-bit bitvectors are not allowed"))
}
