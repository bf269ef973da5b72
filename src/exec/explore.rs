// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::error::Result;
use crate::exec::continuation::{Command, ExceptionKind, Termination};
use crate::exec::externs::ExternRegistry;
use crate::exec::state::ExecutionState;
use crate::exec::stepper::{step, StepEnv};
use crate::exec::watchdog::{DynWatchdog, LazyWatchdog};
use crate::ir::{simplify_single_expression, taint_mask, vars, Context, ExprRef};
use crate::program::{Program, Stmt};
use crate::smt::{SatResult, Solver};
use crate::target::Target;
use crate::testspec::{TestObjects, TestPacket, TestSpec};
use baa::{BitVecOps, BitVecValue};
use rand::{Rng, RngCore, SeedableRng};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DepthFirst,
    BreadthFirst,
    /// pick a uniformly random state from the frontier
    RandomBacktrack,
    /// prefer states that are about to execute a statement that was never executed
    CoverageGuided,
}

#[derive(Debug, Clone)]
pub struct ExplorationOptions {
    pub strategy: Strategy,
    /// Seeds exploration and the values of unconstrained symbols. Without a seed, exploration
    /// uses seed `0` and unconstrained symbols are zero.
    pub seed: Option<u64>,
    pub max_steps_per_path: Option<u64>,
    pub max_forks_per_path: Option<u64>,
    pub max_total_steps: Option<u64>,
    pub time_budget: Option<Duration>,
    pub max_tests: Option<usize>,
    /// Check satisfiability of every new branch condition instead of only at the end of a
    /// path.
    pub check_feasibility_at_fork: bool,
    /// Coverage guided search picks the oldest state after this many consecutive selections.
    pub coverage_starvation_limit: usize,
}

impl Default for ExplorationOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::DepthFirst,
            seed: None,
            max_steps_per_path: None,
            max_forks_per_path: None,
            max_total_steps: None,
            time_budget: None,
            max_tests: None,
            check_feasibility_at_fork: true,
            coverage_starvation_limit: 16,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExplorationStats {
    pub steps: u64,
    pub forks: u64,
    pub tests: usize,
    pub pruned_unsat: u64,
    pub pruned_bound: u64,
    pub solver_unknown: u64,
    /// paths that the target aborted
    pub aborted: u64,
    pub covered_statements: usize,
    pub total_statements: usize,
}

impl ExplorationStats {
    pub fn coverage(&self) -> f64 {
        if self.total_statements == 0 {
            1.0
        } else {
            self.covered_statements as f64 / self.total_statements as f64
        }
    }
}

fn stmt_id(state: &ExecutionState) -> Option<usize> {
    match state.next_command() {
        Some(Command::Stmt(s)) => Some(*s as *const Stmt as usize),
        _ => None,
    }
}

/// Live states that wait to be stepped.
struct Frontier<'p> {
    states: VecDeque<ExecutionState<'p>>,
    strategy: Strategy,
    since_oldest: usize,
    starvation_limit: usize,
}

impl<'p> Frontier<'p> {
    /// Adds the successors of one step. The first successor is explored first by the
    /// depth-first strategy.
    fn extend(&mut self, states: Vec<ExecutionState<'p>>) {
        match self.strategy {
            Strategy::DepthFirst => {
                for s in states.into_iter().rev() {
                    self.states.push_back(s);
                }
            }
            _ => self.states.extend(states),
        }
    }

    fn select(&mut self, rng: &mut impl Rng, covered: &HashSet<usize>) -> Option<ExecutionState<'p>> {
        match self.strategy {
            Strategy::DepthFirst => self.states.pop_back(),
            Strategy::BreadthFirst => self.states.pop_front(),
            Strategy::RandomBacktrack => {
                if self.states.is_empty() {
                    None
                } else {
                    let index = rng.gen_range(0..self.states.len());
                    self.states.swap_remove_back(index)
                }
            }
            Strategy::CoverageGuided => {
                let fresh = if self.since_oldest >= self.starvation_limit {
                    None
                } else {
                    self.states
                        .iter()
                        .rposition(|s| stmt_id(s).is_some_and(|id| !covered.contains(&id)))
                };
                match fresh {
                    Some(index) => {
                        self.since_oldest += 1;
                        self.states.remove(index)
                    }
                    None => {
                        self.since_oldest = 0;
                        self.states.pop_front()
                    }
                }
            }
        }
    }
}

/// Explores the paths of a program and turns every feasible complete path into a test.
pub struct SymbolicExecutor<'p, S: Solver> {
    program: &'p Program,
    target: &'p dyn Target,
    solver: S,
    opts: ExplorationOptions,
    externs: ExternRegistry,
    watchdog: DynWatchdog,
}

impl<'p, S: Solver> SymbolicExecutor<'p, S> {
    pub fn new(
        program: &'p Program,
        target: &'p dyn Target,
        solver: S,
        opts: ExplorationOptions,
    ) -> Self {
        let mut externs = ExternRegistry::with_core();
        target.register_externs(&mut externs);
        Self {
            program,
            target,
            solver,
            opts,
            externs,
            watchdog: LazyWatchdog.in_rc(),
        }
    }

    pub fn with_watchdog(mut self, watchdog: DynWatchdog) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Registers an additional extern handler.
    pub fn externs_mut(&mut self) -> &mut ExternRegistry {
        &mut self.externs
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Runs the exploration. `on_test` receives every generated test and returns whether
    /// exploration should continue.
    pub fn run(
        &mut self,
        ctx: &mut Context,
        mut on_test: impl FnMut(&TestSpec) -> bool,
    ) -> Result<ExplorationStats> {
        let start = Instant::now();
        let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(self.opts.seed.unwrap_or(0));
        let mut stats = ExplorationStats {
            total_statements: self.program.num_statements(),
            ..Default::default()
        };
        let mut covered: HashSet<usize> = HashSet::new();
        let env = StepEnv {
            program: self.program,
            target: self.target,
            externs: &self.externs,
        };

        let mut initial = ExecutionState::new(self.target.pipeline(self.program));
        self.target.initialize(self.program, ctx, &mut initial);
        let mut frontier = Frontier {
            states: VecDeque::from([initial]),
            strategy: self.opts.strategy,
            since_oldest: 0,
            starvation_limit: self.opts.coverage_starvation_limit,
        };

        let poll_every = self.watchdog.poll_every().max(1);
        let mut iterations = 0usize;
        let mut stop = false;
        while !stop {
            iterations += 1;
            if iterations % poll_every == 0 && self.watchdog.should_stop() {
                log::info!("stopped by watchdog");
                break;
            }
            if self.opts.time_budget.is_some_and(|b| start.elapsed() >= b) {
                log::info!("time budget exhausted");
                break;
            }
            if self.opts.max_total_steps.is_some_and(|m| stats.steps >= m) {
                log::info!("step budget exhausted");
                break;
            }
            let Some(state) = frontier.select(&mut rng, &covered) else {
                break;
            };
            if self.opts.max_steps_per_path.is_some_and(|m| state.steps() >= m) {
                log::debug!("pruned path after {} steps", state.steps());
                stats.pruned_bound += 1;
                continue;
            }
            if let Some(id) = stmt_id(&state) {
                covered.insert(id);
            }

            let successors = step(&env, ctx, state);
            stats.steps += 1;
            if successors.len() > 1 {
                stats.forks += successors.len() as u64 - 1;
            }
            let mut live = Vec::with_capacity(successors.len());
            for succ in successors {
                if self
                    .opts
                    .max_forks_per_path
                    .is_some_and(|m| succ.state.forks() > m)
                {
                    stats.pruned_bound += 1;
                    continue;
                }
                if succ.condition.is_some() && self.opts.check_feasibility_at_fork {
                    let constraints: Vec<ExprRef> = succ.state.constraints().collect();
                    match self.solver.check_sat(ctx, &constraints)? {
                        SatResult::Sat => {}
                        SatResult::Unsat => {
                            log::trace!("pruned infeasible path");
                            stats.pruned_unsat += 1;
                            continue;
                        }
                        SatResult::Unknown => {
                            stats.solver_unknown += 1;
                            continue;
                        }
                    }
                }
                if succ.state.is_terminal() {
                    stop = finish(
                        &mut self.solver,
                        &self.opts,
                        ctx,
                        &env,
                        succ.state,
                        &mut rng,
                        &mut stats,
                        &mut on_test,
                    )?;
                    if stop {
                        break;
                    }
                } else {
                    live.push(succ.state);
                }
            }
            frontier.extend(live);
        }

        stats.covered_statements = covered.len();
        log::info!(
            "explored {} steps, {} forks, generated {} tests ({} infeasible, {} out of bounds, {} unknown), statement coverage {:.1}%",
            stats.steps,
            stats.forks,
            stats.tests,
            stats.pruned_unsat,
            stats.pruned_bound,
            stats.solver_unknown,
            stats.coverage() * 100.0
        );
        Ok(stats)
    }
}

/// Solves a terminated path. Returns true iff exploration should stop.
#[allow(clippy::too_many_arguments)]
fn finish<'p, S: Solver>(
    solver: &mut S,
    opts: &ExplorationOptions,
    ctx: &mut Context,
    env: &StepEnv<'p>,
    state: ExecutionState<'p>,
    rng: &mut rand_xoshiro::Xoshiro256PlusPlus,
    stats: &mut ExplorationStats,
    on_test: &mut impl FnMut(&TestSpec) -> bool,
) -> Result<bool> {
    let termination = state.termination().unwrap_or(Termination::Normal);
    let variants: Vec<(bool, Option<ExprRef>)> = match termination {
        Termination::Exception(ExceptionKind::Abort) => {
            stats.aborted += 1;
            return Ok(false);
        }
        Termination::Exception(ExceptionKind::Drop) => vec![(true, None)],
        _ => {
            let pred = env.target.drop_predicate(ctx, &state);
            let pred = simplify_single_expression(ctx, pred);
            match pred.get_bool_lit(ctx) {
                Some(dropped) => vec![(dropped, None)],
                None => {
                    let not_pred = ctx.not(pred);
                    vec![(true, Some(pred)), (false, Some(not_pred))]
                }
            }
        }
    };

    for (dropped, cond) in variants {
        let mut constraints: Vec<ExprRef> = state.constraints().collect();
        constraints.extend(cond);
        match solver.check_sat(ctx, &constraints)? {
            SatResult::Sat => {}
            SatResult::Unsat => {
                stats.pruned_unsat += 1;
                continue;
            }
            SatResult::Unknown => {
                stats.solver_unknown += 1;
                continue;
            }
        }
        let model = solver.get_model(ctx)?;
        let completion_rng: Option<&mut dyn RngCore> = match opts.seed {
            Some(_) => Some(&mut *rng as &mut dyn RngCore),
            None => None,
        };
        let test = build_test(ctx, env.target, &state, model, dropped, completion_rng);
        stats.tests += 1;
        log::debug!("generated test #{}", stats.tests);
        let keep_going = on_test(&test);
        if !keep_going || opts.max_tests.is_some_and(|m| stats.tests >= m) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Evaluates everything a test writer needs under `model`.
pub fn build_test(
    ctx: &mut Context,
    target: &dyn Target,
    state: &ExecutionState,
    mut model: crate::smt::Model,
    dropped: bool,
    rng: Option<&mut dyn RngCore>,
) -> TestSpec {
    let input_port = target.input_port(ctx);
    let output_port = target.output_port(ctx, state);
    let packet = &state.packet;

    let mut referenced: Vec<ExprRef> = vec![input_port, output_port];
    referenced.extend(packet.input.iter().copied());
    referenced.extend(packet.emit.iter().copied());
    for (_, objects) in state.objects() {
        for obj in objects.values() {
            obj.for_each_value(|v| referenced.push(*v));
        }
    }
    model.complete(ctx, referenced, rng);

    // the parser may not have looked at all bits of the packet
    let len = if packet.len_constrained {
        let len = vars::packet_len(ctx);
        model
            .get(len)
            .and_then(|v| v.to_u64())
            .unwrap_or(packet.cursor as u64) as crate::ir::WidthInt
    } else {
        packet.cursor
    };
    let remainder = (len > packet.cursor).then(|| BitVecValue::zero(len - packet.cursor));

    let parsed = concat_all(packet.input.iter().map(|c| model.evaluate(ctx, *c)));
    let ingress_payload = match (parsed, &remainder) {
        (Some(p), _) if len < packet.cursor => {
            (len > 0).then(|| p.slice(packet.cursor - 1, packet.cursor - len))
        }
        (p, r) => concat_all(p.into_iter().chain(r.iter().cloned())),
    };
    let ingress = TestPacket {
        port: model.evaluate(ctx, input_port),
        taint_mask: ingress_payload.as_ref().map(|p| BitVecValue::zero(p.width())),
        payload: ingress_payload,
    };

    let egress = (!dropped).then(|| {
        let emitted = concat_all(packet.emit.iter().map(|e| model.evaluate(ctx, *e)));
        let emitted_mask = concat_all(packet.emit.iter().map(|e| taint_mask(ctx, *e)));
        let remainder_mask = remainder.as_ref().map(|r| BitVecValue::zero(r.width()));
        let payload = concat_all(emitted.into_iter().chain(remainder.iter().cloned()));
        let mask = concat_all(emitted_mask.into_iter().chain(remainder_mask));
        let (payload, mask) = match payload {
            None => match target.zero_width_output() {
                Some((value, mask)) => (Some(value), Some(mask)),
                None => (None, None),
            },
            some => (some, mask),
        };
        TestPacket {
            port: model.evaluate(ctx, output_port),
            payload,
            taint_mask: mask,
        }
    });

    let mut objects: TestObjects = BTreeMap::new();
    for (category, named) in state.objects() {
        let resolved = named
            .iter()
            .map(|(name, obj)| (name.clone(), obj.resolve(ctx, &model)))
            .collect();
        objects.insert(category.clone(), resolved);
    }

    TestSpec {
        ingress,
        egress,
        traces: state.trace().map(|e| e.to_string()).collect(),
        objects,
        termination: state.termination().unwrap_or(Termination::Normal),
    }
}

fn concat_all(values: impl Iterator<Item = BitVecValue>) -> Option<BitVecValue> {
    values.reduce(|a, b| a.concat(&b))
}
