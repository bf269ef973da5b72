// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use baa::BitVecOps;
use p4testgen::exec::*;
use p4testgen::ir::*;
use p4testgen::program::*;
use p4testgen::smt::{EnumerationSolver, SatResult, Solver};
use p4testgen::target::Target;
use p4testgen::testspec::TestSpec;

/// Runs the body of every control once. Control parameters of bit type become symbols.
#[derive(Debug, Default)]
struct Bench {
    taint_uninitialized: bool,
}

impl Target for Bench {
    fn name(&self) -> &str {
        "bench"
    }

    fn pipeline<'p>(&self, program: &'p Program) -> Vec<Command<'p>> {
        program
            .controls
            .iter()
            .flat_map(|c| Command::stmts(&c.body))
            .collect()
    }

    fn initialize<'p>(&self, program: &'p Program, ctx: &mut Context, state: &mut ExecutionState<'p>) {
        for param in program.controls.iter().flat_map(|c| c.params.iter()) {
            let width = param.tpe.scalar_width().unwrap();
            let symbol = ctx.bv_symbol(&param.name, width);
            state.bind(param.name.clone(), symbol);
        }
    }

    fn create_uninitialized(&self, ctx: &mut Context, width: WidthInt, force_taint: bool) -> ExprRef {
        if force_taint || self.taint_uninitialized {
            ctx.taint(width)
        } else {
            ctx.zero(width)
        }
    }

    fn input_port(&self, ctx: &mut Context) -> ExprRef {
        ctx.zero(9)
    }

    fn output_port(&self, ctx: &mut Context, _state: &ExecutionState) -> ExprRef {
        ctx.zero(9)
    }

    fn drop_predicate(&self, ctx: &mut Context, _state: &ExecutionState) -> ExprRef {
        ctx.fals()
    }

    fn register_externs(&self, _registry: &mut ExternRegistry) {}

    fn packet_len_bounds(&self) -> (WidthInt, WidthInt) {
        (0, 0)
    }
}

fn control(params: &[(&str, WidthInt)], body: Vec<Stmt>) -> Program {
    Program {
        controls: vec![Control {
            name: "c".to_string(),
            params: params
                .iter()
                .map(|(n, w)| Param::new(n, Direction::InOut, P4Type::Bits(*w)))
                .collect(),
            body,
        }],
        package: vec!["c".to_string()],
        ..Default::default()
    }
}

/// `if ((a + 15) < b) { b = 1; }`
fn add_and_compare() -> (Program, PExpr) {
    let cond = PExpr::bin(
        BinOp::Lt,
        PExpr::bin(BinOp::Add, PExpr::path("a"), PExpr::bits(15, 4)),
        PExpr::path("b"),
    );
    let body = vec![Stmt::if_then(cond.clone(), Stmt::assign("b", PExpr::bits(1, 4)))];
    (control(&[("a", 4), ("b", 4)], body), cond)
}

/// three independent conditions
fn diamonds() -> Program {
    let body = (0..3)
        .map(|ii| {
            Stmt::if_else(
                PExpr::bin(BinOp::Eq, PExpr::path("x"), PExpr::bits(ii, 4)),
                Stmt::assign("y", PExpr::bits(ii, 4)),
                Stmt::assign("y", PExpr::bits(15 - ii, 4)),
            )
        })
        .collect();
    control(&[("x", 4), ("y", 4)], body)
}

fn run(program: &Program, target: &dyn Target, opts: ExplorationOptions) -> (Vec<TestSpec>, ExplorationStats) {
    let mut ctx = Context::default();
    let mut executor = SymbolicExecutor::new(program, target, EnumerationSolver::default(), opts);
    let mut tests = vec![];
    let stats = executor
        .run(&mut ctx, |t| {
            tests.push(t.clone());
            true
        })
        .unwrap();
    (tests, stats)
}

fn fork<'p>(env: &StepEnv<'p>, ctx: &mut Context, mut state: ExecutionState<'p>) -> Vec<Successor<'p>> {
    loop {
        let succs = step(env, ctx, state);
        if succs.len() != 1 || succs[0].state.is_terminal() {
            return succs;
        }
        state = succs.into_iter().next().unwrap().state;
    }
}

#[test_log::test]
fn single_conditional_has_two_paths() {
    let (program, _) = add_and_compare();
    let (tests, stats) = run(&program, &Bench::default(), ExplorationOptions::default());
    assert_eq!(tests.len(), 2);
    assert_eq!(stats.tests, 2);
    assert_eq!(stats.pruned_unsat, 0);
    assert!(tests.iter().all(|t| t.termination == Termination::Normal));
    assert!(tests.iter().all(|t| !t.is_drop()));
    assert!(tests.iter().all(|t| t.egress.as_ref().unwrap().payload.is_none()));
    let taken: Vec<bool> = tests
        .iter()
        .map(|t| t.traces.iter().any(|e| e.ends_with("is true")))
        .collect();
    assert!(taken.contains(&true) && taken.contains(&false), "{tests:?}");
    assert_eq!(stats.coverage(), 1.0);
}

#[test]
fn model_satisfies_branch_condition() {
    let (program, _) = add_and_compare();
    let target = Bench::default();
    let externs = ExternRegistry::with_core();
    let env = StepEnv {
        program: &program,
        target: &target,
        externs: &externs,
    };
    let mut ctx = Context::default();
    let mut state = ExecutionState::new(target.pipeline(&program));
    target.initialize(&program, &mut ctx, &mut state);
    let succs = fork(&env, &mut ctx, state);
    assert_eq!(succs.len(), 2);

    let mut solver = EnumerationSolver::default();
    let taken = &succs[0];
    let cond = taken.condition.unwrap();
    let constraints: Vec<ExprRef> = taken.state.constraints().collect();
    assert_eq!(solver.check_sat(&ctx, &constraints).unwrap(), SatResult::Sat);
    let model = solver.get_model(&ctx).unwrap();
    assert!(model.evaluate(&ctx, cond).is_tru());
    let a = model.get_by_name(&ctx, "a").unwrap().to_u64().unwrap();
    let b = model.get_by_name(&ctx, "b").unwrap().to_u64().unwrap();
    assert!((a + 15) % 16 < b, "a={a} b={b}");
    assert_eq!(model.len(), 2);

    // repeating the condition does not change the model
    assert_eq!(solver.check_sat(&ctx, &[cond, cond]).unwrap(), SatResult::Sat);
    let again = solver.get_model(&ctx).unwrap();
    assert_eq!(again.len(), 2);
    assert_eq!(again, model);
}

#[test]
fn branch_conditions_are_total() {
    let (program, _) = add_and_compare();
    let target = Bench::default();
    let externs = ExternRegistry::with_core();
    let env = StepEnv {
        program: &program,
        target: &target,
        externs: &externs,
    };
    let mut ctx = Context::default();
    let mut state = ExecutionState::new(target.pipeline(&program));
    target.initialize(&program, &mut ctx, &mut state);
    let succs = fork(&env, &mut ctx, state);
    let negated: Vec<ExprRef> = succs
        .iter()
        .map(|s| s.condition.unwrap())
        .map(|c| ctx.not(c))
        .collect();
    let mut solver = EnumerationSolver::default();
    assert_eq!(solver.check_sat(&ctx, &negated).unwrap(), SatResult::Unsat);
}

#[test]
fn constraints_only_grow() {
    let program = diamonds();
    let target = Bench::default();
    let externs = ExternRegistry::with_core();
    let env = StepEnv {
        program: &program,
        target: &target,
        externs: &externs,
    };
    let mut ctx = Context::default();
    let mut state = ExecutionState::new(target.pipeline(&program));
    target.initialize(&program, &mut ctx, &mut state);
    let mut previous: Vec<ExprRef> = vec![];
    while !state.is_terminal() {
        // always follow the last successor
        state = step(&env, &mut ctx, state).pop().unwrap().state;
        let current: Vec<ExprRef> = state.constraints().collect();
        assert!(current.len() >= previous.len());
        assert_eq!(&current[..previous.len()], previous.as_slice());
        previous = current;
    }
    assert_eq!(previous.len(), 3);
}

#[test]
fn forked_states_do_not_share_stores() {
    let program = diamonds();
    let target = Bench::default();
    let externs = ExternRegistry::with_core();
    let env = StepEnv {
        program: &program,
        target: &target,
        externs: &externs,
    };
    let mut ctx = Context::default();
    let mut state = ExecutionState::new(target.pipeline(&program));
    target.initialize(&program, &mut ctx, &mut state);
    let mut succs = fork(&env, &mut ctx, state);
    let mut other = succs.pop().unwrap().state;
    let mut first = succs.pop().unwrap().state;
    let before = other.get("y");
    let marker = ctx.bv_lit(9, 4);
    first.bind("y", marker);
    assert_eq!(other.get("y"), before);
    other.bind("x", marker);
    assert_ne!(first.get("x"), marker);
}

#[test]
fn exploration_is_deterministic_for_a_seed() {
    let program = diamonds();
    let opts = ExplorationOptions {
        strategy: Strategy::RandomBacktrack,
        seed: Some(7),
        ..Default::default()
    };
    let (a, stats_a) = run(&program, &Bench::default(), opts.clone());
    let (b, stats_b) = run(&program, &Bench::default(), opts);
    assert_eq!(a, b);
    assert_eq!(stats_a, stats_b);
    // x can equal at most one of the constants
    assert_eq!(a.len(), 4);
}

#[test]
fn strategies_find_the_same_paths() {
    let program = diamonds();
    let mut found = vec![];
    for strategy in [
        Strategy::DepthFirst,
        Strategy::BreadthFirst,
        Strategy::RandomBacktrack,
        Strategy::CoverageGuided,
    ] {
        let opts = ExplorationOptions {
            strategy,
            ..Default::default()
        };
        let (tests, stats) = run(&program, &Bench::default(), opts);
        assert_eq!(stats.pruned_unsat, 3, "{strategy:?}");
        let mut traces: Vec<Vec<String>> = tests.into_iter().map(|t| t.traces).collect();
        traces.sort();
        found.push(traces);
    }
    assert!(found.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn limits_stop_exploration() {
    let program = diamonds();
    let opts = ExplorationOptions {
        max_tests: Some(1),
        ..Default::default()
    };
    let (tests, _) = run(&program, &Bench::default(), opts);
    assert_eq!(tests.len(), 1);

    let opts = ExplorationOptions {
        max_forks_per_path: Some(1),
        ..Default::default()
    };
    let (tests, stats) = run(&program, &Bench::default(), opts);
    assert!(tests.is_empty());
    assert!(stats.pruned_bound > 0);

    let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let mut ctx = Context::default();
    let target = Bench::default();
    let mut executor = SymbolicExecutor::new(
        &program,
        &target,
        EnumerationSolver::default(),
        ExplorationOptions::default(),
    )
    .with_watchdog(FlagWatchdog::new(flag).polling_every(1).in_rc());
    let stats = executor.run(&mut ctx, |_| true).unwrap();
    assert_eq!(stats.steps, 0);
    assert_eq!(stats.tests, 0);
}

#[test]
fn uninitialized_reads_follow_the_target_policy() {
    let body = vec![
        Stmt::Declare {
            name: "x".to_string(),
            tpe: P4Type::Bits(8),
            init: None,
        },
        Stmt::if_then(
            PExpr::bin(BinOp::Eq, PExpr::path("x"), PExpr::bits(3, 8)),
            Stmt::assign("x", PExpr::bits(4, 8)),
        ),
    ];
    let program = control(&[], body);

    // zero: the branch is decided without the solver
    let (tests, stats) = run(&program, &Bench::default(), ExplorationOptions::default());
    assert_eq!(tests.len(), 1);
    assert_eq!(stats.forks, 0);

    // taint: both outcomes are possible
    let tainted = Bench {
        taint_uninitialized: true,
    };
    let (tests, _) = run(&program, &tainted, ExplorationOptions::default());
    assert_eq!(tests.len(), 2);

    let mut ctx = Context::default();
    let x = ctx.taint(8);
    let three = ctx.bv_lit(3, 8);
    let five = ctx.bv_lit(5, 8);
    let is_three = ctx.bv_equal(x, three);
    let is_five = ctx.bv_equal(x, five);
    let mut solver = EnumerationSolver::default();
    assert_eq!(solver.check_sat(&ctx, &[is_three]).unwrap(), SatResult::Sat);
    let first = solver.get_model(&ctx).unwrap().evaluate(&ctx, x);
    assert_eq!(solver.check_sat(&ctx, &[is_five]).unwrap(), SatResult::Sat);
    let second = solver.get_model(&ctx).unwrap().evaluate(&ctx, x);
    assert_ne!(first.to_u64(), second.to_u64());
}
