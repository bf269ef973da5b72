// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Table application. The control plane is unknown, so every action of a table may be
//! executed. Hit paths constrain fresh key variables and record the entry that the control
//! plane has to install for the test.

use crate::exec::lower::lower;
use crate::exec::state::{CallArg, ExecutionState, TraceEvent};
use crate::exec::stepper::{StepEnv, Successor};
use crate::ir::{vars, Context, ExprRef, TypeCheck, WidthInt};
use crate::program::{Action, MatchKind, Table, TableImplementation};
use crate::testspec::{ActionCall, TableMatch, TableRule, TestObject};

pub const ACTION_RUN_WIDTH: WidthInt = 32;
pub const TABLE_CONFIGS: &str = "tableconfigs";
pub const ACTION_PROFILES: &str = "action_profile";
pub const ACTION_SELECTORS: &str = "action_selector";

/// Index of the action that `$action_run` refers to. The default action gets the index after
/// the last action, unless it is part of the action list.
pub fn action_index(table: &Table, action: &str) -> usize {
    table
        .actions
        .iter()
        .position(|a| a == action)
        .unwrap_or(table.actions.len())
}

/// Name of the action with `index` in the sense of [`action_index`].
pub fn action_name(table: &Table, index: usize) -> &str {
    table
        .actions
        .get(index)
        .unwrap_or(&table.default_action.name)
}

pub fn apply_table<'p>(
    env: &StepEnv<'p>,
    ctx: &mut Context,
    mut state: ExecutionState<'p>,
    table: &'p Table,
) -> Vec<Successor<'p>> {
    let incarnation = state.next_incarnation();
    let keys: Vec<ExprRef> = table
        .keys
        .iter()
        .map(|k| lower(ctx, env.program, &state, &k.expr))
        .collect();
    let mut out = vec![];

    // keyless tables always execute their default action
    if !table.keys.is_empty() {
        let matches = key_matches(ctx, table, incarnation, &keys);
        let hit_cond = ctx.and_many(matches.iter().map(|(c, _)| *c));
        let rule_matches: Vec<TableMatch<ExprRef>> =
            matches.into_iter().map(|(_, m)| m).collect();

        for (index, name) in table.actions.iter().enumerate() {
            let action = env.program.find_action(name);
            let mut hit = state.clone();
            let args: Vec<(String, ExprRef)> = action
                .params
                .iter()
                .map(|p| {
                    let width = p.tpe.scalar_width().unwrap_or_else(|| {
                        panic!("parameter {}.{} needs a scalar type", name, p.name)
                    });
                    let zombie =
                        vars::zombie_table_name(&table.name, incarnation, &format!("{name}.{}", p.name), &[]);
                    (p.name.clone(), ctx.bv_symbol(&zombie, width))
                })
                .collect();
            let call = ActionCall {
                action: name.clone(),
                args: args.clone(),
            };
            record_entry(&mut hit, table, rule_matches.clone(), call);
            let tru = ctx.tru();
            hit.bind(vars::table_hit_name(&table.name), tru);
            let run = ctx.bv_lit(index as u64, ACTION_RUN_WIDTH);
            hit.bind(vars::table_action_run_name(&table.name), run);
            hit.add_trace(TraceEvent::TableHit {
                table: table.name.clone(),
                action: name.clone(),
            });
            let values = args.into_iter().map(|(_, v)| CallArg::Value(v)).collect();
            push_action(&mut hit, action, values);
            out.push(Successor::guarded(hit, hit_cond));
        }
    }

    let default = env.program.find_action(&table.default_action.name);
    let values = table
        .default_action
        .args
        .iter()
        .map(|a| CallArg::Value(lower(ctx, env.program, &state, a)))
        .collect();
    let fals = ctx.fals();
    state.bind(vars::table_hit_name(&table.name), fals);
    let run = ctx.bv_lit(
        action_index(table, &default.name) as u64,
        ACTION_RUN_WIDTH,
    );
    state.bind(vars::table_action_run_name(&table.name), run);
    state.add_trace(TraceEvent::TableMiss {
        table: table.name.clone(),
        action: default.name.clone(),
    });
    push_action(&mut state, default, values);
    out.push(Successor::new(state));
    out
}

/// One condition and one rule fragment per key.
fn key_matches(
    ctx: &mut Context,
    table: &Table,
    incarnation: u32,
    keys: &[ExprRef],
) -> Vec<(ExprRef, TableMatch<ExprRef>)> {
    table
        .keys
        .iter()
        .zip(keys.iter())
        .enumerate()
        .map(|(index, (key, value))| {
            let width = value.get_width(ctx);
            let index = index as u32;
            let name = vars::zombie_table_name(&table.name, incarnation, "key", &[index]);
            let zombie = ctx.bv_symbol(&name, width);
            let (cond, mask) = match key.match_kind {
                MatchKind::Exact => (ctx.bv_equal(*value, zombie), None),
                MatchKind::Ternary | MatchKind::Lpm => {
                    let name = vars::zombie_table_name(&table.name, incarnation, "mask", &[index]);
                    let mask = ctx.bv_symbol(&name, width);
                    let masked_value = ctx.and(*value, mask);
                    let masked_key = ctx.and(zombie, mask);
                    let mut cond = ctx.bv_equal(masked_value, masked_key);
                    if key.match_kind == MatchKind::Lpm {
                        // a prefix mask is a run of ones followed by zeros, i.e. its inverse
                        // plus one is a power of two
                        let inverse = ctx.not(mask);
                        let one = ctx.one(width);
                        let next = ctx.add(inverse, one);
                        let overlap = ctx.and(inverse, next);
                        let zero = ctx.zero(width);
                        let is_prefix = ctx.bv_equal(overlap, zero);
                        cond = ctx.and(cond, is_prefix);
                    }
                    (cond, Some(mask))
                }
            };
            let fragment = TableMatch {
                key: key.name.clone(),
                kind: key.match_kind,
                value: zombie,
                mask,
            };
            (cond, fragment)
        })
        .collect()
}

fn record_entry(
    state: &mut ExecutionState,
    table: &Table,
    matches: Vec<TableMatch<ExprRef>>,
    call: ActionCall<ExprRef>,
) {
    let mut rules = match state.object(TABLE_CONFIGS, &table.name) {
        Some(TestObject::TableConfig { rules, .. }) => rules.clone(),
        _ => vec![],
    };
    rules.push(TableRule {
        matches,
        action: call.clone(),
    });
    let config = TestObject::TableConfig {
        table: table.name.clone(),
        rules,
    };
    state.set_object(TABLE_CONFIGS, &table.name, config);

    match &table.implementation {
        None => {}
        Some(TableImplementation::ActionProfile(profile)) => {
            let mut actions = match state.object(ACTION_PROFILES, profile) {
                Some(TestObject::ActionProfile { actions, .. }) => actions.clone(),
                _ => vec![],
            };
            actions.push(call);
            let obj = TestObject::ActionProfile {
                profile: profile.clone(),
                actions,
            };
            state.set_object(ACTION_PROFILES, profile, obj);
        }
        Some(TableImplementation::ActionSelector(selector)) => {
            let mut actions = match state.object(ACTION_SELECTORS, selector) {
                Some(TestObject::ActionSelector { actions, .. }) => actions.clone(),
                _ => vec![],
            };
            actions.push(call);
            let obj = TestObject::ActionSelector {
                selector: selector.clone(),
                actions,
            };
            state.set_object(ACTION_SELECTORS, selector, obj);
        }
    }
}

pub(crate) fn push_action<'p>(state: &mut ExecutionState<'p>, action: &'p Action, args: Vec<CallArg>) {
    state.push_call(&action.name, &action.params, &action.body, args, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::continuation::{Command, Termination};
    use crate::exec::externs::ExternRegistry;
    use crate::exec::stepper::step;
    use crate::program::{
        ActionRef, Direction, P4Type, PExpr, Param, Program, Stmt, SwitchCase, SwitchLabel,
        TableKey,
    };
    use crate::smt::{EnumerationSolver, SatResult, Solver};
    use crate::target::V1Model;

    fn table(name: &str, match_kind: MatchKind, implementation: Option<TableImplementation>) -> Table {
        Table {
            name: name.to_string(),
            keys: vec![TableKey {
                name: "k".to_string(),
                expr: PExpr::path("k"),
                match_kind,
            }],
            actions: vec!["set".to_string(), "nop".to_string()],
            default_action: ActionRef {
                name: "nop".to_string(),
                args: vec![],
            },
            implementation,
        }
    }

    fn program() -> Program {
        Program {
            actions: vec![
                Action {
                    name: "set".to_string(),
                    params: vec![Param::new("v", Direction::None, P4Type::Bits(4))],
                    body: vec![Stmt::assign("out", PExpr::path("v"))],
                },
                Action {
                    name: "nop".to_string(),
                    params: vec![],
                    body: vec![],
                },
            ],
            tables: vec![
                table("t", MatchKind::Exact, None),
                table("routes", MatchKind::Lpm, None),
                table(
                    "profiled",
                    MatchKind::Exact,
                    Some(TableImplementation::ActionProfile("ap".to_string())),
                ),
                table(
                    "selected",
                    MatchKind::Exact,
                    Some(TableImplementation::ActionSelector("as".to_string())),
                ),
            ],
            ..Default::default()
        }
    }

    /// A state with a symbolic 4-bit `k` and `out` set to 15.
    fn initial<'p>(ctx: &mut Context, cmds: impl IntoIterator<Item = Command<'p>>) -> ExecutionState<'p> {
        let mut state = ExecutionState::new(cmds);
        let k = ctx.bv_symbol("k", 4);
        state.bind("k", k);
        let out = ctx.bv_lit(15, 4);
        state.bind("out", out);
        state
    }

    /// Every path that the stepper can take, without checking feasibility.
    fn run_all<'p>(env: &StepEnv<'p>, ctx: &mut Context, state: ExecutionState<'p>) -> Vec<ExecutionState<'p>> {
        let mut todo = vec![state];
        let mut done = vec![];
        while let Some(state) = todo.pop() {
            for succ in step(env, ctx, state) {
                if succ.state.is_terminal() {
                    done.push(succ.state);
                } else {
                    todo.push(succ.state);
                }
            }
        }
        done
    }

    fn rules(state: &ExecutionState, table: &str) -> Vec<TableRule<ExprRef>> {
        match state.object(TABLE_CONFIGS, table) {
            Some(TestObject::TableConfig { rules, .. }) => rules.clone(),
            _ => vec![],
        }
    }

    #[test]
    fn one_hit_per_action_and_a_miss() {
        let program = program();
        let target = V1Model::default();
        let externs = ExternRegistry::with_core();
        let env = StepEnv {
            program: &program,
            target: &target,
            externs: &externs,
        };
        let mut ctx = Context::default();
        let t = program.find_table("t");
        let state = initial(&mut ctx, [Command::TableApply(t)]);
        let succs = step(&env, &mut ctx, state);
        assert_eq!(succs.len(), 3);
        let hit = ctx.tru();
        let miss = ctx.fals();
        let run = |ctx: &Context, s: &ExecutionState| s.get("t.$action_run").get_bv_lit(ctx);

        for (index, succ) in succs[..2].iter().enumerate() {
            assert!(succ.condition.is_some());
            assert_eq!(succ.state.get("t.$hit"), hit);
            assert_eq!(run(&ctx, &succ.state), Some(index as u64));
            let rules = rules(&succ.state, "t");
            assert_eq!(rules.len(), 1);
            assert_eq!(rules[0].action.action, table_action(index));
        }
        // the control plane may install nothing
        assert!(succs[2].condition.is_none());
        assert_eq!(succs[2].state.get("t.$hit"), miss);
        assert_eq!(run(&ctx, &succs[2].state), Some(1));
        assert!(rules(&succs[2].state, "t").is_empty());

        // the hit on `set` matches exactly the key of the entry
        let cond = succs[0].condition.unwrap();
        let entry = rules(&succs[0].state, "t").remove(0);
        let key = entry.matches[0].value;
        let k = ctx.bv_symbol("k", 4);
        let other = ctx.bv_equal(k, key);
        let other = ctx.not(other);
        let mut solver = EnumerationSolver::default();
        assert_eq!(solver.check_sat(&ctx, &[cond]).unwrap(), SatResult::Sat);
        assert_eq!(solver.check_sat(&ctx, &[cond, other]).unwrap(), SatResult::Unsat);

        // the action writes its control plane argument
        let arg = entry.action.args[0].1;
        let ends: Vec<ExecutionState> = succs
            .into_iter()
            .flat_map(|s| run_all(&env, &mut ctx, s.state))
            .collect();
        assert_eq!(ends.len(), 3);
        assert!(ends.iter().all(|s| s.termination() == Some(Termination::Normal)));
        assert_eq!(ends[0].get("out"), arg);
        let fifteen = ctx.bv_lit(15, 4);
        assert_eq!(ends[1].get("out"), fifteen);
        assert_eq!(ends[2].get("out"), fifteen);
    }

    fn table_action(index: usize) -> &'static str {
        ["set", "nop"][index]
    }

    #[test]
    fn lpm_masks_are_prefixes() {
        let program = program();
        let target = V1Model::default();
        let externs = ExternRegistry::with_core();
        let env = StepEnv {
            program: &program,
            target: &target,
            externs: &externs,
        };
        let mut ctx = Context::default();
        let state = initial(&mut ctx, [Command::TableApply(program.find_table("routes"))]);
        let succs = step(&env, &mut ctx, state);
        assert_eq!(succs.len(), 3);
        let cond = succs[0].condition.unwrap();
        let entry = rules(&succs[0].state, "routes").remove(0);
        assert_eq!(entry.matches[0].kind, MatchKind::Lpm);
        let mask = entry.matches[0].mask.unwrap();

        let mut solver = EnumerationSolver::default();
        let mut with_mask = |ctx: &mut Context, value: u64| {
            let value = ctx.bv_lit(value, 4);
            let is_mask = ctx.bv_equal(mask, value);
            solver.check_sat(ctx, &[cond, is_mask]).unwrap()
        };
        assert_eq!(with_mask(&mut ctx, 0b1100), SatResult::Sat);
        assert_eq!(with_mask(&mut ctx, 0b1111), SatResult::Sat);
        assert_eq!(with_mask(&mut ctx, 0b0000), SatResult::Sat);
        assert_eq!(with_mask(&mut ctx, 0b0101), SatResult::Unsat);
        assert_eq!(with_mask(&mut ctx, 0b0011), SatResult::Unsat);
    }

    #[test]
    fn profiles_and_selectors_record_members() {
        let program = program();
        let target = V1Model::default();
        let externs = ExternRegistry::with_core();
        let env = StepEnv {
            program: &program,
            target: &target,
            externs: &externs,
        };
        let mut ctx = Context::default();

        let state = initial(&mut ctx, [Command::TableApply(program.find_table("profiled"))]);
        let succs = step(&env, &mut ctx, state);
        assert_eq!(succs.len(), 3);
        match succs[0].state.object(ACTION_PROFILES, "ap") {
            Some(TestObject::ActionProfile { profile, actions }) => {
                assert_eq!(profile, "ap");
                assert_eq!(actions.len(), 1);
                assert_eq!(actions[0].action, "set");
                assert_eq!(actions[0].args.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(succs[2].state.object(ACTION_PROFILES, "ap").is_none());

        let state = initial(&mut ctx, [Command::TableApply(program.find_table("selected"))]);
        let succs = step(&env, &mut ctx, state);
        match succs[1].state.object(ACTION_SELECTORS, "as") {
            Some(TestObject::ActionSelector { selector, actions }) => {
                assert_eq!(selector, "as");
                assert_eq!(actions.len(), 1);
                assert_eq!(actions[0].action, "nop");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(succs[2].state.object(ACTION_SELECTORS, "as").is_none());
    }

    #[test]
    fn switch_runs_the_case_of_the_executed_action() {
        let program = program();
        let target = V1Model::default();
        let externs = ExternRegistry::with_core();
        let env = StepEnv {
            program: &program,
            target: &target,
            externs: &externs,
        };
        let stmt = Stmt::Switch {
            table: "t".to_string(),
            cases: vec![
                SwitchCase {
                    label: SwitchLabel::Action("set".to_string()),
                    body: vec![Stmt::assign("case", PExpr::bits(1, 2))],
                },
                SwitchCase {
                    label: SwitchLabel::Default,
                    body: vec![Stmt::assign("case", PExpr::bits(2, 2))],
                },
            ],
        };
        let mut ctx = Context::default();
        let mut state = initial(&mut ctx, [Command::Stmt(&stmt)]);
        let zero = ctx.zero(2);
        state.bind("case", zero);
        let ends = run_all(&env, &mut ctx, state);
        assert_eq!(ends.len(), 3);
        for end in ends.iter() {
            let run = end.get("t.$action_run").get_bv_lit(&ctx);
            let case = end.get("case").get_bv_lit(&ctx);
            let hit = end.get("t.$hit").get_bool_lit(&ctx);
            match (hit, run) {
                (Some(true), Some(0)) => assert_eq!(case, Some(1)),
                (_, Some(1)) => assert_eq!(case, Some(2)),
                other => panic!("unexpected table result {other:?}"),
            }
        }
    }
}
