// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::error::Result;
use crate::ir::{collect_leaves, eval_bv_expr, Context, ExprRef, TypeCheck, WidthInt};
use crate::smt::model::Model;
use crate::smt::solver::{dedup_assumptions, AssertionTrail, SatResult, Solver};
use baa::{BitVecOps, BitVecValue};

/// Default limit on the number of free bits that [`EnumerationSolver`] is willing to search.
pub const DEFAULT_MAX_FREE_BITS: WidthInt = 20;

/// Decides satisfiability by trying every assignment to the free variables, in increasing
/// numeric order. The first satisfying assignment becomes the model, which makes the
/// solver fully deterministic. Constraint sets with more than `max_free_bits` free bits
/// are reported as [`SatResult::Unknown`].
#[derive(Debug, Clone)]
pub struct EnumerationSolver {
    trail: AssertionTrail,
    max_free_bits: WidthInt,
    model: Option<Model>,
}

impl Default for EnumerationSolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FREE_BITS)
    }
}

impl EnumerationSolver {
    pub fn new(max_free_bits: WidthInt) -> Self {
        assert!(max_free_bits < 64, "cannot enumerate {max_free_bits} bits");
        Self {
            trail: AssertionTrail::default(),
            max_free_bits,
            model: None,
        }
    }

    fn search(&self, ctx: &Context, constraints: &[ExprRef]) -> (SatResult, Option<Model>) {
        let leaves = collect_leaves(ctx, constraints.iter().copied());
        let widths: Vec<WidthInt> = leaves.iter().map(|l| l.get_width(ctx)).collect();
        let free_bits: WidthInt = widths.iter().sum();
        if free_bits > self.max_free_bits {
            log::debug!(
                "{free_bits} free bits exceed the enumeration limit of {}",
                self.max_free_bits
            );
            return (SatResult::Unknown, None);
        }
        for assignment in 0u64..(1u64 << free_bits) {
            let mut offset = 0;
            let values: Vec<(ExprRef, BitVecValue)> = leaves
                .iter()
                .zip(widths.iter())
                .map(|(leaf, width)| {
                    let raw = (assignment >> offset) & crate::ir::bv_mask_value(*width);
                    offset += width;
                    (*leaf, BitVecValue::from_u64(raw, *width))
                })
                .collect();
            let all_hold = constraints
                .iter()
                .all(|c| eval_bv_expr(ctx, values.as_slice(), *c).is_tru());
            if all_hold {
                let mut model = Model::default();
                for (leaf, value) in values {
                    model.insert(ctx, leaf, value);
                }
                return (SatResult::Sat, Some(model));
            }
        }
        (SatResult::Unsat, None)
    }
}

impl Solver for EnumerationSolver {
    fn name(&self) -> &str {
        "enumeration"
    }

    fn assert(&mut self, ctx: &Context, expr: ExprRef) -> Result<()> {
        debug_assert!(expr.is_bool(ctx), "assertions need to be boolean");
        self.trail.assert(expr);
        Ok(())
    }

    fn push(&mut self) -> Result<()> {
        self.trail.push();
        Ok(())
    }

    fn pop(&mut self) -> Result<()> {
        self.trail.pop();
        Ok(())
    }

    fn check_sat(&mut self, ctx: &Context, assumptions: &[ExprRef]) -> Result<SatResult> {
        let assumptions = dedup_assumptions(assumptions);
        let constraints: Vec<ExprRef> = self
            .trail
            .assertions()
            .chain(assumptions.iter().copied())
            .collect();
        let (result, model) = self.search(ctx, &constraints);
        self.model = model;
        self.trail.record_check(result, assumptions);
        Ok(result)
    }

    fn get_model(&mut self, _ctx: &Context) -> Result<Model> {
        self.trail.model_assumptions();
        Ok(self
            .model
            .clone()
            .unwrap_or_else(|| panic!("satisfiable check without a model")))
    }
}
