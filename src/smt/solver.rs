// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::error::{Error, Result};
use crate::ir::{collect_leaves, Context, ExprRef, TypeCheck};
use crate::smt::model::Model;
use crate::smt::parse::parse_smt_bit_vec;
use crate::smt::serialize::{convert_expr, convert_tpe, leaf_smt_name};
use easy_smt as smt;
use indexmap::IndexSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    /// The solver gave up, e.g., because of a timeout.
    Unknown,
}

/// Incremental satisfiability checking over bit-vector formulas.
///
/// Re-asserting an expression that is already asserted in an open scope does not change
/// anything. [`Solver::get_model`] may only be called after a [`Solver::check_sat`] that
/// returned [`SatResult::Sat`] and before any assertion was added or scope was popped.
pub trait Solver {
    fn name(&self) -> &str;
    fn assert(&mut self, ctx: &Context, expr: ExprRef) -> Result<()>;
    fn push(&mut self) -> Result<()>;
    fn pop(&mut self) -> Result<()>;
    /// Checks the current assertions together with `assumptions`, which are only
    /// considered for this check.
    fn check_sat(&mut self, ctx: &Context, assumptions: &[ExprRef]) -> Result<SatResult>;
    /// Returns values for every symbol that the assertions and the assumptions of the last
    /// check refer to.
    fn get_model(&mut self, ctx: &Context) -> Result<Model>;
}

/// Keeps track of asserted expressions per scope and detects stale model requests.
#[derive(Debug, Default, Clone)]
pub(crate) struct AssertionTrail {
    asserted: IndexSet<ExprRef>,
    scope_starts: Vec<usize>,
    /// incremented every time the assertion set or scope stack changes
    generation: u64,
    /// generation and assumptions of the last satisfiable check
    last_sat: Option<(u64, Vec<ExprRef>)>,
}

impl AssertionTrail {
    /// Returns false if `expr` was already asserted.
    pub(crate) fn assert(&mut self, expr: ExprRef) -> bool {
        let is_new = self.asserted.insert(expr);
        if is_new {
            self.generation += 1;
        }
        is_new
    }

    pub(crate) fn push(&mut self) {
        self.scope_starts.push(self.asserted.len());
        self.generation += 1;
    }

    /// The solver state changed in a way that is not visible in the assertion set.
    pub(crate) fn invalidate_model(&mut self) {
        self.generation += 1;
    }

    pub(crate) fn pop(&mut self) {
        let start = self
            .scope_starts
            .pop()
            .unwrap_or_else(|| panic!("pop without matching push"));
        self.asserted.truncate(start);
        self.generation += 1;
    }

    pub(crate) fn assertions(&self) -> impl Iterator<Item = ExprRef> + '_ {
        self.asserted.iter().copied()
    }

    pub(crate) fn record_check(&mut self, result: SatResult, assumptions: Vec<ExprRef>) {
        self.last_sat = match result {
            SatResult::Sat => Some((self.generation, assumptions)),
            _ => None,
        };
    }

    /// Returns the assumptions of the last check. Panics if no model is available.
    pub(crate) fn model_assumptions(&self) -> &[ExprRef] {
        match &self.last_sat {
            None => panic!("no model available: the last satisfiability check did not return sat"),
            Some((generation, _)) if *generation != self.generation => {
                panic!("stale model: assertions changed since the last satisfiability check")
            }
            Some((_, assumptions)) => assumptions,
        }
    }
}

/// Removes duplicates while keeping the first occurrence.
pub(crate) fn dedup_assumptions(assumptions: &[ExprRef]) -> Vec<ExprRef> {
    let unique: IndexSet<ExprRef> = assumptions.iter().copied().collect();
    unique.into_iter().collect()
}

#[derive(Debug, Clone, Copy)]
pub struct SmtSolverCmd {
    pub name: &'static str,
    pub args: &'static [&'static str],
    /// name of the option that sets a per-check timeout in milliseconds
    pub timeout_option: Option<&'static str>,
}

pub const BITWUZLA_CMD: SmtSolverCmd = SmtSolverCmd {
    name: "bitwuzla",
    args: &["--smt2", "--incremental"],
    timeout_option: None,
};

pub const YICES2_CMD: SmtSolverCmd = SmtSolverCmd {
    name: "yices-smt2",
    args: &["--incremental"],
    timeout_option: None,
};

pub const Z3_CMD: SmtSolverCmd = SmtSolverCmd {
    name: "z3",
    args: &["-in", "-smt2"],
    timeout_option: Some(":timeout"),
};

impl SmtSolverCmd {
    /// Returns true iff the solver binary can be started.
    pub fn is_available(&self) -> bool {
        std::process::Command::new(self.name)
            .arg("--version")
            .output()
            .is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SmtSolverOptions {
    /// If set, the communication with the SMT solver will be logged into this file.
    pub replay_file: Option<std::path::PathBuf>,
    /// Per-check timeout in milliseconds. Only honored by solvers with a timeout option.
    pub timeout_ms: Option<u64>,
}

/// [`Solver`] backed by an external SMT solver process.
pub struct SmtSolver {
    smt_ctx: smt::Context,
    cmd: SmtSolverCmd,
    trail: AssertionTrail,
    /// declarations are scoped in SMT-LIB, so we need to track them per scope
    declared: IndexSet<ExprRef>,
    declared_starts: Vec<usize>,
    /// true while the assumptions of the last check are still asserted in their own scope
    assumption_scope_open: bool,
}

impl SmtSolver {
    pub fn new(cmd: SmtSolverCmd, opts: &SmtSolverOptions) -> Result<Self> {
        let replay_file = match &opts.replay_file {
            Some(path) => Some(std::fs::File::create(path)?),
            None => None,
        };
        let mut smt_ctx = smt::ContextBuilder::new()
            .solver(cmd.name, cmd.args)
            .replay_file(replay_file)
            .build()?;
        smt_ctx.set_logic("QF_BV")?;
        if let (Some(option), Some(ms)) = (cmd.timeout_option, opts.timeout_ms) {
            let value = smt_ctx.numeral(ms);
            smt_ctx.set_option(option, value)?;
        }
        log::debug!("started {} for path feasibility checks", cmd.name);
        Ok(Self {
            smt_ctx,
            cmd,
            trail: AssertionTrail::default(),
            declared: IndexSet::new(),
            declared_starts: vec![],
            assumption_scope_open: false,
        })
    }

    fn close_assumption_scope(&mut self) -> Result<()> {
        if self.assumption_scope_open {
            self.smt_ctx.pop_many(1)?;
            self.declared.truncate(self.declared_starts.pop().unwrap_or(0));
            self.assumption_scope_open = false;
            self.trail.invalidate_model();
        }
        Ok(())
    }

    fn declare_leaves(&mut self, ctx: &Context, expr: ExprRef) -> Result<()> {
        for leaf in collect_leaves(ctx, [expr]) {
            if self.declared.insert(leaf) {
                let tpe = convert_tpe(&self.smt_ctx, leaf.get_width(ctx));
                self.smt_ctx.declare_const(leaf_smt_name(ctx, leaf), tpe)?;
            }
        }
        Ok(())
    }

    fn push_scope(&mut self) -> Result<()> {
        self.smt_ctx.push_many(1)?;
        self.declared_starts.push(self.declared.len());
        Ok(())
    }
}

impl Solver for SmtSolver {
    fn name(&self) -> &str {
        self.cmd.name
    }

    fn assert(&mut self, ctx: &Context, expr: ExprRef) -> Result<()> {
        debug_assert!(expr.is_bool(ctx), "assertions need to be boolean");
        self.close_assumption_scope()?;
        if self.trail.assert(expr) {
            self.declare_leaves(ctx, expr)?;
            let e = convert_expr(&self.smt_ctx, ctx, expr);
            self.smt_ctx.assert(e)?;
        }
        Ok(())
    }

    fn push(&mut self) -> Result<()> {
        self.close_assumption_scope()?;
        self.trail.push();
        self.push_scope()
    }

    fn pop(&mut self) -> Result<()> {
        self.close_assumption_scope()?;
        self.trail.pop();
        self.smt_ctx.pop_many(1)?;
        self.declared.truncate(self.declared_starts.pop().unwrap_or(0));
        Ok(())
    }

    fn check_sat(&mut self, ctx: &Context, assumptions: &[ExprRef]) -> Result<SatResult> {
        self.close_assumption_scope()?;
        let assumptions = dedup_assumptions(assumptions);
        if !assumptions.is_empty() {
            // the scope stays open, so that a model can be queried afterwards
            self.push_scope()?;
            self.assumption_scope_open = true;
            for &a in assumptions.iter() {
                self.declare_leaves(ctx, a)?;
                let e = convert_expr(&self.smt_ctx, ctx, a);
                self.smt_ctx.assert(e)?;
            }
        }
        let result = match self.smt_ctx.check()? {
            smt::Response::Sat => SatResult::Sat,
            smt::Response::Unsat => SatResult::Unsat,
            smt::Response::Unknown => {
                log::warn!("{} returned unknown", self.cmd.name);
                SatResult::Unknown
            }
        };
        self.trail.record_check(result, assumptions);
        Ok(result)
    }

    fn get_model(&mut self, ctx: &Context) -> Result<Model> {
        let assumptions = self.trail.model_assumptions().to_vec();
        let leaves = collect_leaves(ctx, self.trail.assertions().chain(assumptions));
        let mut model = Model::default();
        if leaves.is_empty() {
            return Ok(model);
        }
        let atoms = leaves
            .iter()
            .map(|leaf| self.smt_ctx.atom(leaf_smt_name(ctx, *leaf)))
            .collect();
        let values = self.smt_ctx.get_value(atoms)?;
        for (leaf, (_, value)) in leaves.iter().zip(values) {
            let parsed = parse_smt_bit_vec(&self.smt_ctx, value).ok_or_else(|| {
                Error::UnexpectedSolverResponse(self.smt_ctx.display(value).to_string())
            })?;
            model.insert(ctx, *leaf, parsed);
        }
        Ok(model)
    }
}
