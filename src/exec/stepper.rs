// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! The single-step evaluator. [`step`] consumes exactly one command and returns one
//! successor per feasible way to continue. The input state is moved in, so the only way
//! to observe a side effect is through a successor.

use crate::exec::continuation::{Command, ExceptionKind, Termination};
use crate::exec::externs::{ExternCall, ExternRegistry};
use crate::exec::lower::lower;
use crate::exec::state::{CallArg, ExecutionState, TraceEvent};
use crate::exec::table::{action_name, apply_table, push_action};
use crate::ir::{simplify_single_expression, vars, Context, ExprRef, SerializableIrNode, TypeCheck};
use crate::program::{
    KeySet, MethodCall, P4Type, PExpr, Param, Parser, Program, Stmt, SwitchCase, SwitchLabel,
    Table, Transition, ACCEPT, ERROR_WIDTH, REJECT,
};
use crate::target::Target;

/// Everything that stays the same while exploring one program.
pub struct StepEnv<'p> {
    pub program: &'p Program,
    pub target: &'p dyn Target,
    pub externs: &'p ExternRegistry,
}

/// A state produced by [`step`] together with the condition that was added to its path
/// constraints. `condition` is `None` for deterministic steps.
#[derive(Debug, Clone)]
pub struct Successor<'p> {
    pub state: ExecutionState<'p>,
    pub condition: Option<ExprRef>,
}

impl<'p> Successor<'p> {
    pub fn new(state: ExecutionState<'p>) -> Self {
        Self {
            state,
            condition: None,
        }
    }

    pub fn guarded(state: ExecutionState<'p>, condition: ExprRef) -> Self {
        Self {
            state,
            condition: Some(condition),
        }
    }
}

pub fn step<'p>(
    env: &StepEnv<'p>,
    ctx: &mut Context,
    mut state: ExecutionState<'p>,
) -> Vec<Successor<'p>> {
    assert!(!state.is_terminal(), "cannot step a terminated path");
    state.count_step();
    let raw = match state.stack.pop() {
        None => {
            state.terminate(Termination::Normal);
            vec![Successor::new(state)]
        }
        Some(cmd) => step_command(env, ctx, state, cmd),
    };
    finalize(ctx, raw)
}

/// Adds the branch conditions to the successors and removes successors whose condition
/// is trivially false.
fn finalize<'p>(ctx: &mut Context, raw: Vec<Successor<'p>>) -> Vec<Successor<'p>> {
    let mut out: Vec<Successor<'p>> = Vec::with_capacity(raw.len());
    for mut succ in raw {
        if let Some(cond) = succ.condition {
            debug_assert!(cond.is_bool(ctx));
            let cond = simplify_single_expression(ctx, cond);
            match cond.get_bool_lit(ctx) {
                Some(false) => continue,
                Some(true) => succ.condition = None,
                None => {
                    succ.state.add_constraint(ctx, cond);
                    succ.condition = Some(cond);
                }
            }
        }
        if !succ.state.is_terminal() && succ.state.stack.is_empty() {
            succ.state.terminate(Termination::Normal);
        }
        out.push(succ);
    }
    if out.len() > 1 {
        for succ in out.iter_mut() {
            succ.state.count_fork();
        }
    }
    out
}

fn one<'p>(state: ExecutionState<'p>) -> Vec<Successor<'p>> {
    vec![Successor::new(state)]
}

fn step_command<'p>(
    env: &StepEnv<'p>,
    ctx: &mut Context,
    mut state: ExecutionState<'p>,
    cmd: Command<'p>,
) -> Vec<Successor<'p>> {
    match cmd {
        Command::Stmt(stmt) => step_stmt(env, ctx, state, stmt),
        Command::Branch { cond, tru, fals } => {
            let cond = lower(ctx, env.program, &state, cond);
            let not_cond = ctx.not(cond);
            let description = cond.serialize_to_str(ctx);
            let mut taken = state.clone();
            taken.add_trace(TraceEvent::Branch {
                cond: description.clone(),
                taken: true,
            });
            taken.push_command(Command::Stmt(tru));
            state.add_trace(TraceEvent::Branch {
                cond: description,
                taken: false,
            });
            if let Some(fals) = fals {
                state.push_command(Command::Stmt(fals));
            }
            vec![
                Successor::guarded(taken, cond),
                Successor::guarded(state, not_cond),
            ]
        }
        Command::Declare { path, tpe } => {
            state.declare(ctx, env.program, env.target, &path, &tpe);
            one(state)
        }
        Command::Copy { dst, src } => {
            state.copy(&dst, &src);
            one(state)
        }
        Command::Bind { dst, value } => {
            state.bind(dst, value);
            one(state)
        }
        Command::Call {
            body,
            result,
            scope,
        } => {
            state.stack.enter_call(body, result, scope);
            one(state)
        }
        Command::Trap { body, handlers } => {
            state.stack.enter_trap(body, handlers);
            one(state)
        }
        Command::Return(value) => {
            match (state.stack.ret(), value) {
                (Some(dst), Some(value)) => state.bind(dst, value),
                (Some(dst), None) => panic!("missing return value for `{dst}`"),
                (None, _) => {}
            }
            one(state)
        }
        Command::Exception(kind) => {
            state.raise(kind);
            one(state)
        }
        Command::MethodCall { call, result } => method_call(env, ctx, state, call, result),
        Command::ParserState { parser, state: name } => {
            let parser_state = parser
                .states
                .iter()
                .find(|s| s.name == name)
                .unwrap_or_else(|| {
                    crate::program::suggest(
                        "parser state",
                        name,
                        parser.states.iter().map(|s| s.name.as_str()),
                    )
                });
            state.add_trace(TraceEvent::ParserState {
                parser: parser.name.clone(),
                state: name.to_string(),
            });
            state.push_commands(Command::stmts(&parser_state.body).into_iter().chain([
                Command::Transition {
                    parser,
                    transition: &parser_state.transition,
                },
            ]));
            one(state)
        }
        Command::Transition { parser, transition } => {
            step_transition(env, ctx, state, parser, transition)
        }
        Command::TableApply(table) => apply_table(env, ctx, state, table),
        Command::SwitchActionRun { table, cases } => {
            let run = state.get(&vars::table_action_run_name(&table.name));
            let index = run
                .get_bv_lit(ctx)
                .unwrap_or_else(|| panic!("action run of `{}` is symbolic", table.name));
            if let Some(case) = select_switch_case(table, cases, index as usize) {
                state.push_commands(Command::stmts(&case.body));
            }
            one(state)
        }
        Command::Hook(name) => env
            .externs
            .invoke(&name, env, ctx, &ExternCall::hook(), state),
    }
}

fn select_switch_case<'p>(
    table: &Table,
    cases: &'p [SwitchCase],
    index: usize,
) -> Option<&'p SwitchCase> {
    let executed = action_name(table, index);
    cases
        .iter()
        .find(|c| matches!(&c.label, SwitchLabel::Action(a) if a == executed))
        .or_else(|| cases.iter().find(|c| c.label == SwitchLabel::Default))
}

fn step_stmt<'p>(
    env: &StepEnv<'p>,
    ctx: &mut Context,
    mut state: ExecutionState<'p>,
    stmt: &'p Stmt,
) -> Vec<Successor<'p>> {
    match stmt {
        Stmt::Declare { name, tpe, init } => {
            let path = state.declare_local(name);
            state.declare(ctx, env.program, env.target, &path, tpe);
            if let Some(init) = init {
                assign(env, ctx, &mut state, &path, init);
            }
            one(state)
        }
        Stmt::Assign { lhs, rhs } => {
            let lhs = state.resolve(lhs);
            assign(env, ctx, &mut state, &lhs, rhs);
            one(state)
        }
        Stmt::If { cond, tru, fals } => {
            let mut tables = vec![];
            cond.for_each_table_hit(&mut |t| tables.push(env.program.find_table(t)));
            let branch = Command::Branch {
                cond,
                tru: &**tru,
                fals: fals.as_deref(),
            };
            state.push_commands(tables.into_iter().map(Command::TableApply).chain([branch]));
            one(state)
        }
        Stmt::Block(stmts) => {
            state.push_commands(Command::stmts(stmts));
            one(state)
        }
        Stmt::Call { call, result } => {
            state.push_command(Command::MethodCall {
                call,
                result: result.as_deref(),
            });
            one(state)
        }
        Stmt::Apply(table) => {
            state.push_command(Command::TableApply(env.program.find_table(table)));
            one(state)
        }
        Stmt::Switch { table, cases } => {
            let table = env.program.find_table(table);
            state.push_commands([
                Command::TableApply(table),
                Command::SwitchActionRun {
                    table,
                    cases: cases.as_slice(),
                },
            ]);
            one(state)
        }
        Stmt::Return(value) => {
            let value = value.as_ref().map(|v| lower(ctx, env.program, &state, v));
            state.push_command(Command::Return(value));
            one(state)
        }
        Stmt::Exit => {
            state.push_command(Command::Exception(ExceptionKind::Exit));
            one(state)
        }
        Stmt::Verify { cond, error } => {
            let cond = lower(ctx, env.program, &state, cond);
            let failed = ctx.not(cond);
            let code = ctx.bv_lit(env.program.error_code(error), ERROR_WIDTH);
            let mut reject = state.clone();
            reject.bind(vars::PARSER_ERROR, code);
            reject.push_command(Command::Exception(ExceptionKind::Reject));
            vec![
                Successor::guarded(state, cond),
                Successor::guarded(reject, failed),
            ]
        }
    }
}

/// Writes `rhs` to the location `dst`. Headers and structs are copied leaf by leaf.
fn assign(env: &StepEnv, ctx: &mut Context, state: &mut ExecutionState, dst: &str, rhs: &PExpr) {
    if let PExpr::Path(src) = rhs {
        let src = state.resolve(src);
        if let Some(P4Type::Named(_)) = state.type_of(&src) {
            state.copy(dst, &src);
            return;
        }
    }
    let value = lower(ctx, env.program, state, rhs);
    state.bind(dst, value);
}

fn call_args(
    ctx: &mut Context,
    program: &Program,
    state: &ExecutionState,
    params: &[Param],
    args: &[PExpr],
) -> Vec<CallArg> {
    assert_eq!(
        params.len(),
        args.len(),
        "wrong number of arguments: expected {}, got {}",
        params.len(),
        args.len()
    );
    args.iter()
        .map(|a| match a {
            PExpr::Path(path) => CallArg::Path(state.resolve(path)),
            other => CallArg::Value(lower(ctx, program, state, other)),
        })
        .collect()
}

fn method_call<'p>(
    env: &StepEnv<'p>,
    ctx: &mut Context,
    mut state: ExecutionState<'p>,
    call: &'p MethodCall,
    result: Option<&'p str>,
) -> Vec<Successor<'p>> {
    let extern_call = ExternCall {
        receiver: call.receiver.as_deref(),
        args: &call.args,
        result,
    };
    let result = result.map(|r| state.resolve(r));
    if let Some(receiver) = &call.receiver {
        let receiver = state.resolve(receiver);
        let receiver_type = state.type_of(&receiver).cloned();
        match (call.method.as_str(), receiver_type) {
            ("setValid" | "setInvalid", Some(P4Type::Named(_))) => {
                let valid = ctx.bool_lit(call.method == "setValid");
                state.bind(vars::validity_name(&receiver), valid);
                one(state)
            }
            ("isValid", Some(P4Type::Named(_))) => {
                let dst = result.unwrap_or_else(|| panic!("result of isValid is unused"));
                let valid = state.get(&vars::validity_name(&receiver));
                state.bind(dst, valid);
                one(state)
            }
            (method, Some(P4Type::Extern(tpe))) => {
                let name = format!("{tpe}.{method}");
                env.externs.invoke(&name, env, ctx, &extern_call, state)
            }
            (method, other) => {
                panic!("cannot call `{method}` on `{receiver}` of type {other:?}")
            }
        }
    } else if let Some(action) = env.program.try_find_action(&call.method) {
        let args = call_args(ctx, env.program, &state, &action.params, &call.args);
        push_action(&mut state, action, args);
        one(state)
    } else if let Some(function) = env.program.try_find_function(&call.method) {
        let args = call_args(ctx, env.program, &state, &function.params, &call.args);
        state.push_call(&function.name, &function.params, &function.body, args, result);
        one(state)
    } else {
        env.externs
            .invoke(&call.method, env, ctx, &extern_call, state)
    }
}

/// The command that continues parsing in `next`, `None` for accept.
fn goto<'p>(parser: &'p Parser, next: &'p str) -> Option<Command<'p>> {
    match next {
        ACCEPT => None,
        REJECT => Some(Command::Exception(ExceptionKind::Reject)),
        state => Some(Command::ParserState { parser, state }),
    }
}

fn keyset_matches(ctx: &mut Context, key: ExprRef, keyset: &KeySet) -> ExprRef {
    let width = key.get_width(ctx);
    let lit = |ctx: &mut Context, v: u64| ctx.bv_lit(v & crate::ir::bv_mask_value(width), width);
    match keyset {
        KeySet::Default => ctx.tru(),
        KeySet::Value(v) => {
            let v = lit(ctx, *v);
            ctx.bv_equal(key, v)
        }
        KeySet::Mask { value, mask } => {
            let value = lit(ctx, *value);
            let mask = lit(ctx, *mask);
            let masked_key = ctx.and(key, mask);
            let masked_value = ctx.and(value, mask);
            ctx.bv_equal(masked_key, masked_value)
        }
        KeySet::Range { lo, hi } => {
            let lo = lit(ctx, *lo);
            let hi = lit(ctx, *hi);
            let above = ctx.greater_or_equal(key, lo);
            let below = ctx.less_or_equal(key, hi);
            ctx.and(above, below)
        }
    }
}

fn step_transition<'p>(
    env: &StepEnv<'p>,
    ctx: &mut Context,
    mut state: ExecutionState<'p>,
    parser: &'p Parser,
    transition: &'p Transition,
) -> Vec<Successor<'p>> {
    match transition {
        Transition::Direct(next) => {
            if let Some(cmd) = goto(parser, next) {
                state.push_command(cmd);
            }
            one(state)
        }
        Transition::Select { keys, cases } => {
            let keys: Vec<ExprRef> = keys
                .iter()
                .map(|k| lower(ctx, env.program, &state, k))
                .collect();
            let mut out = vec![];
            let mut earlier = vec![];
            let mut has_default = false;
            for case in cases.iter() {
                let is_default = case.keysets.iter().all(|k| *k == KeySet::Default);
                let matches = if is_default {
                    ctx.tru()
                } else {
                    assert_eq!(
                        case.keysets.len(),
                        keys.len(),
                        "select case needs one key set per key"
                    );
                    let conds: Vec<ExprRef> = keys
                        .iter()
                        .zip(case.keysets.iter())
                        .map(|(key, keyset)| keyset_matches(ctx, *key, keyset))
                        .collect();
                    ctx.and_many(conds)
                };
                let any_earlier = ctx.or_many(earlier.iter().copied());
                let no_earlier = ctx.not(any_earlier);
                let cond = ctx.and(matches, no_earlier);
                let mut next = state.clone();
                if let Some(cmd) = goto(parser, &case.next) {
                    next.push_command(cmd);
                }
                out.push(Successor::guarded(next, cond));
                earlier.push(matches);
                if is_default {
                    has_default = true;
                    break;
                }
            }
            if !has_default {
                let any = ctx.or_many(earlier);
                let none = ctx.not(any);
                let code = ctx.bv_lit(env.program.error_code("NoMatch"), ERROR_WIDTH);
                state.bind(vars::PARSER_ERROR, code);
                state.push_command(Command::Exception(ExceptionKind::NoMatch));
                out.push(Successor::guarded(state, none));
            }
            out
        }
    }
}
