// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::ir::{Context, Expr, ExprRef};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

pub trait ForEachChild<T: Clone> {
    fn for_each_child(&self, visitor: impl FnMut(&T));
    fn num_children(&self) -> usize;
}

impl ForEachChild<ExprRef> for Expr {
    fn for_each_child(&self, mut visitor: impl FnMut(&ExprRef)) {
        match self {
            Expr::BVSymbol { .. } | Expr::BVLiteral { .. } | Expr::BVTaint { .. } => {}
            Expr::BVZeroExt { e, .. } | Expr::BVSlice { e, .. } => visitor(e),
            Expr::BVNot(e, _) | Expr::BVNegate(e, _) => visitor(e),
            Expr::BVEqual(a, b)
            | Expr::BVImplies(a, b)
            | Expr::BVGreater(a, b)
            | Expr::BVGreaterSigned(a, b)
            | Expr::BVGreaterEqual(a, b)
            | Expr::BVConcat(a, b, _)
            | Expr::BVAnd(a, b, _)
            | Expr::BVOr(a, b, _)
            | Expr::BVXor(a, b, _)
            | Expr::BVShiftLeft(a, b, _)
            | Expr::BVShiftRight(a, b, _)
            | Expr::BVAdd(a, b, _)
            | Expr::BVMul(a, b, _)
            | Expr::BVSub(a, b, _) => {
                visitor(a);
                visitor(b);
            }
            Expr::BVIte { cond, tru, fals } => {
                visitor(cond);
                visitor(tru);
                visitor(fals);
            }
        }
    }

    fn num_children(&self) -> usize {
        let mut count = 0;
        self.for_each_child(|_| count += 1);
        count
    }
}

/// Visits expression nodes bottom up while propagating values.
/// Children values are passed in the order in which `for_each_child` visits them.
/// Shared sub-expressions are only visited once.
pub fn bottom_up<R: Clone>(
    ctx: &Context,
    expr: ExprRef,
    mut f: impl FnMut(&Context, ExprRef, &Expr, &[R]) -> R,
) -> R {
    let mut done: HashMap<ExprRef, R> = HashMap::new();
    let mut todo = vec![(expr, false)];
    let mut args: SmallVec<[R; 3]> = SmallVec::new();

    while let Some((e, children_done)) = todo.pop() {
        if done.contains_key(&e) {
            continue;
        }
        let node = ctx.get(e);
        if !children_done {
            let mut children: SmallVec<[ExprRef; 3]> = SmallVec::new();
            node.for_each_child(|c| {
                if !done.contains_key(c) {
                    children.push(*c);
                }
            });
            if !children.is_empty() {
                todo.push((e, true));
                todo.extend(children.into_iter().rev().map(|c| (c, false)));
                continue;
            }
        }
        args.clear();
        node.for_each_child(|c| args.push(done[c].clone()));
        let result = f(ctx, e, node, &args);
        done.insert(e, result);
    }

    done.remove(&expr)
        .expect("the root is always the last node to be computed")
}

/// Returns all symbols and taint leaves that `expr` depends on, in the order of first occurrence.
pub fn collect_leaves(ctx: &Context, exprs: impl IntoIterator<Item = ExprRef>) -> Vec<ExprRef> {
    let mut visited = HashSet::new();
    let mut out = vec![];
    for root in exprs {
        let mut todo: SmallVec<[ExprRef; 8]> = smallvec::smallvec![root];
        while let Some(e) = todo.pop() {
            if !visited.insert(e) {
                continue;
            }
            let node = ctx.get(e);
            if node.is_symbol() || node.is_taint() {
                out.push(e);
            }
            let mut children: SmallVec<[ExprRef; 3]> = SmallVec::new();
            node.for_each_child(|c| children.push(*c));
            todo.extend(children.into_iter().rev());
        }
    }
    out
}

/// Only the symbols (no taint leaves) that the expressions depend on.
pub fn collect_symbols(ctx: &Context, exprs: impl IntoIterator<Item = ExprRef>) -> Vec<ExprRef> {
    collect_leaves(ctx, exprs)
        .into_iter()
        .filter(|e| e.is_symbol(ctx))
        .collect()
}
