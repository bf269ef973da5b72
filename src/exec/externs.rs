// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Named handlers for calls that are not defined in the program itself.

use crate::exec::continuation::{Command, ExceptionKind};
use crate::exec::state::{ExecutionState, TraceEvent};
use crate::exec::stepper::{StepEnv, Successor};
use crate::ir::{simplify_single_expression, vars, Context, ExprRef};
use crate::program::{P4Type, PExpr, TypeKind};
use indexmap::IndexMap;

/// The call site of an extern method.
#[derive(Debug, Clone, Copy)]
pub struct ExternCall<'p> {
    pub receiver: Option<&'p str>,
    pub args: &'p [PExpr],
    /// where the return value goes
    pub result: Option<&'p str>,
}

impl<'p> ExternCall<'p> {
    /// Target hooks do not have a call site in the program.
    pub fn hook() -> Self {
        Self {
            receiver: None,
            args: &[],
            result: None,
        }
    }

    /// Location of the l-value passed as argument `index`.
    pub fn path_arg(&self, state: &ExecutionState, index: usize) -> String {
        match self.args.get(index) {
            Some(PExpr::Path(path)) => state.resolve(path),
            other => panic!("argument {index} needs to be a path, not {other:?}"),
        }
    }
}

pub type ExternHandler = for<'p> fn(
    &StepEnv<'p>,
    &mut Context,
    &ExternCall<'p>,
    ExecutionState<'p>,
) -> Vec<Successor<'p>>;

#[derive(Clone, Default)]
pub struct ExternRegistry {
    handlers: IndexMap<String, ExternHandler>,
}

impl std::fmt::Debug for ExternRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl ExternRegistry {
    /// A registry with the packet handling methods that every target shares.
    pub fn with_core() -> Self {
        let mut registry = Self::default();
        registry.register("packet_in.extract", extract);
        registry.register("packet_out.emit", emit);
        registry
    }

    /// Registers `handler` for `name`, which is either `extern_type.method` or the name of
    /// an extern function. Replaces any previous handler.
    pub fn register(&mut self, name: &str, handler: ExternHandler) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn invoke<'p>(
        &self,
        name: &str,
        env: &StepEnv<'p>,
        ctx: &mut Context,
        call: &ExternCall<'p>,
        mut state: ExecutionState<'p>,
    ) -> Vec<Successor<'p>> {
        let handler = self.handlers.get(name).unwrap_or_else(|| {
            crate::program::suggest(
                "extern",
                name,
                self.handlers.keys().map(|k| k.as_str()),
            )
        });
        state.add_trace(TraceEvent::ExternCall {
            name: name.to_string(),
        });
        handler(env, ctx, call, state)
    }
}

fn header_type<'a>(state: &'a ExecutionState, path: &str) -> &'a str {
    match state.type_of(path) {
        Some(P4Type::Named(name)) => name,
        other => panic!("`{path}` is not a header or struct instance: {other:?}"),
    }
}

fn extract<'p>(
    env: &StepEnv<'p>,
    ctx: &mut Context,
    call: &ExternCall<'p>,
    mut state: ExecutionState<'p>,
) -> Vec<Successor<'p>> {
    let header = call.path_arg(&state, 0);
    let fields = env
        .program
        .header_fields(&header, header_type(&state, &header));
    let width: u32 = fields.iter().map(|(_, w)| *w).sum();
    let len = vars::packet_len(ctx);

    if !state.packet.len_constrained {
        let (min, max) = env.target.packet_len_bounds();
        let min = ctx.bv_lit(min as u64, vars::PACKET_LEN_WIDTH);
        let max = ctx.bv_lit(max as u64, vars::PACKET_LEN_WIDTH);
        let lower = ctx.greater_or_equal(len, min);
        let upper = ctx.less_or_equal(len, max);
        let low_bits = ctx.slice(len, 2, 0);
        let zero = ctx.zero(3);
        let whole_bytes = ctx.bv_equal(low_bits, zero);
        for c in [lower, upper, whole_bytes] {
            state.add_constraint(ctx, c);
        }
        state.packet.len_constrained = true;
    }

    let cursor = state.packet.cursor;
    let required = ctx.bv_lit((cursor + width) as u64, vars::PACKET_LEN_WIDTH);
    let fits = ctx.greater_or_equal(len, required);
    let too_short = ctx.not(fits);

    let mut short = state.clone();
    let code = env.program.error_code("PacketTooShort");
    let code = ctx.bv_lit(code, crate::program::ERROR_WIDTH);
    short.bind(vars::PARSER_ERROR, code);
    short.push_command(Command::Exception(ExceptionKind::PacketTooShort));

    let chunk = ctx.bv_symbol(&vars::packet_chunk_name(cursor, width), width);
    let mut msb = width;
    for (field, field_width) in fields {
        let value = ctx.slice(chunk, msb - 1, msb - field_width);
        state.bind(field, value);
        msb -= field_width;
    }
    let valid = ctx.tru();
    state.bind(vars::validity_name(&header), valid);
    state.packet.input.push_back(chunk);
    state.packet.cursor += width;
    state.add_trace(TraceEvent::Extract {
        header,
        cursor,
        width,
    });

    vec![
        Successor::guarded(state, fits),
        Successor::guarded(short, too_short),
    ]
}

/// Header instances at or below `path`, in declaration order.
fn headers_below(env: &StepEnv, state: &ExecutionState, path: &str, out: &mut Vec<String>) {
    let decl = env.program.find_type(header_type(state, path));
    if decl.kind == TypeKind::Header {
        out.push(path.to_string());
    } else {
        for field in decl.fields.iter() {
            if let P4Type::Named(_) = field.tpe {
                headers_below(env, state, &format!("{path}.{}", field.name), out);
            }
        }
    }
}

fn emit<'p>(
    env: &StepEnv<'p>,
    ctx: &mut Context,
    call: &ExternCall<'p>,
    state: ExecutionState<'p>,
) -> Vec<Successor<'p>> {
    let mut headers = vec![];
    headers_below(env, &state, &call.path_arg(&state, 0), &mut headers);

    // every combination of header validities that is not decided yet needs its own path
    let mut partial: Vec<(ExecutionState<'p>, Vec<ExprRef>)> = vec![(state.clone(), vec![])];
    for header in headers {
        let valid = state.get(&vars::validity_name(&header));
        let valid = simplify_single_expression(ctx, valid);
        let tpe = header_type(&state, &header).to_string();
        let fields: Vec<ExprRef> = env
            .program
            .header_fields(&header, &tpe)
            .iter()
            .map(|(f, _)| state.get(f))
            .collect();
        let do_emit = |s: &mut ExecutionState<'p>| {
            s.packet.emit.extend(fields.iter().copied());
            s.add_trace(TraceEvent::Emit {
                header: header.clone(),
            });
        };
        partial = match valid.get_bool_lit(ctx) {
            Some(true) => partial
                .into_iter()
                .map(|(mut s, conds)| {
                    do_emit(&mut s);
                    (s, conds)
                })
                .collect(),
            Some(false) => partial,
            None => {
                let invalid = ctx.not(valid);
                let mut next = Vec::with_capacity(partial.len() * 2);
                for (s, conds) in partial {
                    let mut emitted = s.clone();
                    do_emit(&mut emitted);
                    let mut emitted_conds = conds.clone();
                    emitted_conds.push(valid);
                    next.push((emitted, emitted_conds));
                    let mut skipped_conds = conds;
                    skipped_conds.push(invalid);
                    next.push((s, skipped_conds));
                }
                next
            }
        };
    }
    partial
        .into_iter()
        .map(|(s, conds)| {
            if conds.is_empty() {
                Successor::new(s)
            } else {
                let cond = ctx.and_many(conds);
                Successor::guarded(s, cond)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{eval_bv_expr, TypeCheck};
    use crate::program::{Program, TypeDecl};
    use crate::target::{V1Model, V1ModelConfig};
    use baa::{BitVecOps, BitVecValue};

    fn program() -> Program {
        Program {
            types: vec![
                TypeDecl::header("h_t", &[("a", 8), ("b", 8)]),
                TypeDecl::structure(
                    "headers_t",
                    &[("first", P4Type::named("h_t")), ("second", P4Type::named("h_t"))],
                ),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn extract_forks_on_packet_length() {
        let program = program();
        let target = V1Model::new(V1ModelConfig {
            max_packet_bits: 64,
            ..Default::default()
        });
        let externs = ExternRegistry::with_core();
        let env = StepEnv {
            program: &program,
            target: &target,
            externs: &externs,
        };
        let second_args = [PExpr::path("hdr.second")];
        let mut ctx = Context::default();
        let mut state = ExecutionState::new([]);
        state.declare(&mut ctx, &program, &target, "hdr", &P4Type::named("headers_t"));
        let args = [PExpr::path("hdr.first")];
        let call = ExternCall {
            receiver: Some("pkt"),
            args: &args,
            result: None,
        };
        let succs = externs.invoke("packet_in.extract", &env, &mut ctx, &call, state);
        assert_eq!(succs.len(), 2);
        let (fits, short) = (&succs[0], &succs[1]);

        // lower and upper bound plus whole bytes
        assert_eq!(fits.state.num_constraints(), 3);
        assert_eq!(fits.state.packet.cursor, 16);
        assert_eq!(fits.state.packet.input.len(), 1);
        let valid = fits.state.get("hdr.first.$valid");
        assert_eq!(valid.get_bool_lit(&ctx), Some(true));
        assert_eq!(fits.state.get("hdr.second.$valid").get_bool_lit(&ctx), Some(false));
        let chunk = fits.state.packet.input[0];
        assert_eq!(chunk.get_width(&ctx), 16);

        let len = vars::packet_len(&mut ctx);
        let holds = |ctx: &Context, cond: ExprRef, bits: u64| {
            let values = [(len, BitVecValue::from_u64(bits, vars::PACKET_LEN_WIDTH))];
            eval_bv_expr(ctx, values.as_slice(), cond).is_tru()
        };
        let fits_cond = fits.condition.unwrap();
        let short_cond = short.condition.unwrap();
        assert!(holds(&ctx, fits_cond, 16));
        assert!(!holds(&ctx, short_cond, 16));
        assert!(!holds(&ctx, fits_cond, 8));
        assert!(holds(&ctx, short_cond, 8));

        // the first field is the most significant byte of the chunk
        let values = [(chunk, BitVecValue::from_u64(0xab12, 16))];
        let a = eval_bv_expr(&ctx, values.as_slice(), fits.state.get("hdr.first.a"));
        assert_eq!(a.to_u64(), Some(0xab));

        assert_eq!(
            short.state.get(vars::PARSER_ERROR).get_bv_lit(&ctx),
            Some(program.error_code("PacketTooShort"))
        );
        assert!(matches!(
            short.state.next_command(),
            Some(Command::Exception(ExceptionKind::PacketTooShort))
        ));
        assert_eq!(short.state.packet.cursor, 0);

        // the bounds are only added once, the second header starts after the first
        let call = ExternCall {
            receiver: Some("pkt"),
            args: &second_args,
            result: None,
        };
        let succs = externs.invoke("packet_in.extract", &env, &mut ctx, &call, succs[0].state.clone());
        assert_eq!(succs[0].state.num_constraints(), 3);
        assert_eq!(succs[0].state.packet.cursor, 32);
        let fits_cond = succs[0].condition.unwrap();
        assert!(!holds(&ctx, fits_cond, 24));
        assert!(holds(&ctx, fits_cond, 32));
    }

    #[test]
    fn emit_forks_on_undecided_validity() {
        let program = program();
        let target = V1Model::default();
        let externs = ExternRegistry::with_core();
        let env = StepEnv {
            program: &program,
            target: &target,
            externs: &externs,
        };
        let args = [PExpr::path("hdr")];
        let mut ctx = Context::default();
        let mut state = ExecutionState::new([]);
        state.declare(&mut ctx, &program, &target, "hdr", &P4Type::named("headers_t"));
        let tru = ctx.tru();
        state.bind("hdr.first.$valid", tru);
        let call = ExternCall {
            receiver: Some("pkt"),
            args: &args,
            result: None,
        };

        // validity of both headers is known
        let succs = externs.invoke("packet_out.emit", &env, &mut ctx, &call, state.clone());
        assert_eq!(succs.len(), 1);
        assert!(succs[0].condition.is_none());
        assert_eq!(succs[0].state.packet.emit.len(), 2);
        assert_eq!(succs[0].state.packet.emit_width(&ctx), 16);

        let c = ctx.bv_symbol("c", 1);
        state.bind("hdr.second.$valid", c);
        let succs = externs.invoke("packet_out.emit", &env, &mut ctx, &call, state);
        assert_eq!(succs.len(), 2);
        assert_eq!(succs[0].condition, Some(c));
        assert_eq!(succs[0].state.packet.emit_width(&ctx), 32);
        let not_c = ctx.not(c);
        assert_eq!(succs[1].condition, Some(not_c));
        assert_eq!(succs[1].state.packet.emit_width(&ctx), 16);
        let emitted: Vec<String> = succs[0].state.trace().map(|e| e.to_string()).collect();
        assert_eq!(
            emitted,
            [
                "[extern] packet_out.emit",
                "[emit] hdr.first",
                "[emit] hdr.second"
            ]
        );
    }
}
