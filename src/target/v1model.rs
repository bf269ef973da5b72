// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! The `V1Switch` architecture of the BMv2 simple switch.
//!
//! The package lists parser, checksum verification, ingress, egress, checksum computation
//! and deparser. Blocks receive the architecture variables `*hdr`, `*meta`,
//! `*standard_metadata` and the packet objects according to the types of their parameters.
//! The traffic manager runs after the first control that sees the standard metadata.

use crate::exec::{
    copy_in_copy_out, CallArg, Command, ExecutionState, ExceptionKind, ExternCall,
    ExternRegistry, StepEnv, Successor,
};
use crate::ir::{vars, Context, ExprRef, TypeCheck, WidthInt};
use crate::program::{Block, P4Type, Param, Program, TypeDecl, ERROR_WIDTH};
use crate::target::{ParamPolicy, Target};
use crate::testspec::TestObject;
use baa::BitVecValue;
use im::{OrdMap, Vector};

pub const STANDARD_METADATA_TYPE: &str = "standard_metadata_t";
pub const PORT_WIDTH: WidthInt = 9;
pub const CLONE_INFOS: &str = "clone_infos";

const PKT_IN: &str = "*pkt_in";
const PKT_OUT: &str = "*pkt_out";
const STANDARD_METADATA: &str = "*standard_metadata";
const INGRESS_PORT: &str = "*ingress_port";
const DROP_PORT: &str = "*drop_port";
const TRAFFIC_MANAGER: &str = "*traffic_manager";
/// program specific headers and metadata, in the order in which the blocks list them
const USER_ARGS: [&str; 2] = ["*hdr", "*meta"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V1ModelConfig {
    /// egress port that drops the packet
    pub drop_port: u64,
    /// smallest input packet in bits
    pub min_packet_bits: WidthInt,
    /// largest input packet in bits
    pub max_packet_bits: WidthInt,
    /// uninitialized storage holds arbitrary values instead of zero
    pub taint_uninitialized: bool,
    /// replaces an empty output packet, BMv2 never emits zero bytes
    pub zero_width_sentinel: u64,
    pub zero_width_mask: u64,
    pub zero_width_bits: WidthInt,
}

impl Default for V1ModelConfig {
    fn default() -> Self {
        Self {
            drop_port: 511,
            min_packet_bits: 0,
            max_packet_bits: 12000 * 8,
            taint_uninitialized: false,
            zero_width_sentinel: 0x0200_0000,
            zero_width_mask: 0xffff_ffff,
            zero_width_bits: 32,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct V1Model {
    config: V1ModelConfig,
}

impl V1Model {
    pub fn new(config: V1ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &V1ModelConfig {
        &self.config
    }

    /// The metadata that the architecture passes to its blocks. Programs need to include it
    /// in their type declarations.
    pub fn standard_metadata_type() -> TypeDecl {
        TypeDecl::structure(
            STANDARD_METADATA_TYPE,
            &[
                ("ingress_port", P4Type::Bits(PORT_WIDTH)),
                ("egress_spec", P4Type::Bits(PORT_WIDTH)),
                ("egress_port", P4Type::Bits(PORT_WIDTH)),
                ("instance_type", P4Type::Bits(32)),
                ("packet_length", P4Type::Bits(32)),
                ("parser_error", P4Type::Error),
            ],
        )
    }
}

fn is_standard_metadata(tpe: &P4Type) -> bool {
    matches!(tpe, P4Type::Named(n) if n == STANDARD_METADATA_TYPE)
}

/// Architecture variable for each parameter of `params`.
fn block_args(params: &[Param]) -> Vec<&'static str> {
    let mut user = USER_ARGS.iter();
    params
        .iter()
        .map(|p| match &p.tpe {
            P4Type::Extern(e) if e == "packet_in" => PKT_IN,
            P4Type::Extern(e) if e == "packet_out" => PKT_OUT,
            tpe if is_standard_metadata(tpe) => STANDARD_METADATA,
            _ => user.next().copied().unwrap_or_else(|| {
                panic!("parameter `{}` does not match any V1Switch argument", p.name)
            }),
        })
        .collect()
}

impl Target for V1Model {
    fn name(&self) -> &str {
        "v1model"
    }

    fn pipeline<'p>(&self, program: &'p Program) -> Vec<Command<'p>> {
        let mut cmds = vec![];
        let mut traffic_manager_placed = false;
        for block in program.pipeline() {
            let params = block.params();
            let args = block_args(params)
                .into_iter()
                .map(|a| CallArg::Path(a.to_string()))
                .collect();
            let (copy_in, copy_out) =
                copy_in_copy_out(None, params, args, |p| self.param_policy(block.name(), p));
            cmds.extend(copy_in);
            match block {
                Block::Parser(parser) => {
                    let start = Command::ParserState {
                        parser,
                        state: "start",
                    };
                    let body = Command::Call {
                        body: Vector::unit(start),
                        result: None,
                        scope: None,
                    };
                    // parser errors do not stop the packet
                    let handlers: OrdMap<_, _> = [
                        ExceptionKind::Reject,
                        ExceptionKind::PacketTooShort,
                        ExceptionKind::NoMatch,
                    ]
                    .into_iter()
                    .map(|k| (k, Vector::new()))
                    .collect();
                    cmds.push(Command::Trap {
                        body: Vector::unit(body),
                        handlers,
                    });
                }
                Block::Control(control) => {
                    let body = Command::Call {
                        body: Command::stmts(&control.body),
                        result: None,
                        scope: None,
                    };
                    cmds.push(Command::Trap {
                        body: Vector::unit(body),
                        handlers: OrdMap::unit(ExceptionKind::Exit, Vector::new()),
                    });
                }
            }
            cmds.extend(copy_out);
            match block {
                Block::Parser(_) => cmds.push(Command::Copy {
                    dst: format!("{STANDARD_METADATA}.parser_error"),
                    src: vars::PARSER_ERROR.to_string(),
                }),
                Block::Control(_)
                    if !traffic_manager_placed && params.iter().any(|p| is_standard_metadata(&p.tpe)) =>
                {
                    cmds.push(Command::Hook(TRAFFIC_MANAGER.to_string()));
                    traffic_manager_placed = true;
                }
                Block::Control(_) => {}
            }
        }
        cmds
    }

    fn initialize<'p>(&self, program: &'p Program, ctx: &mut Context, state: &mut ExecutionState<'p>) {
        let mut declared: Vec<&str> = vec![];
        for block in program.pipeline() {
            for (param, arg) in block.params().iter().zip(block_args(block.params())) {
                if !declared.contains(&arg) {
                    state.declare(ctx, program, self, arg, &param.tpe);
                    declared.push(arg);
                }
            }
        }

        let no_error = ctx.bv_lit(program.error_code("NoError"), ERROR_WIDTH);
        state.bind(vars::PARSER_ERROR, no_error);
        let drop_port = ctx.bv_lit(self.config.drop_port, PORT_WIDTH);
        state.bind(DROP_PORT, drop_port);

        if declared.contains(&STANDARD_METADATA) {
            let field = |name: &str| format!("{STANDARD_METADATA}.{name}");
            let port = self.input_port(ctx);
            state.bind(field("ingress_port"), port);
            let zero_port = ctx.zero(PORT_WIDTH);
            state.bind(field("egress_spec"), zero_port);
            state.bind(field("egress_port"), zero_port);
            let normal = ctx.zero(32);
            state.bind(field("instance_type"), normal);
            let len = vars::packet_len(ctx);
            let three = ctx.bv_lit(3, vars::PACKET_LEN_WIDTH);
            let bytes = ctx.shift_right(len, three);
            state.bind(field("packet_length"), bytes);
            state.bind(field("parser_error"), no_error);
        }
    }

    fn create_uninitialized(&self, ctx: &mut Context, width: WidthInt, force_taint: bool) -> ExprRef {
        if force_taint || self.config.taint_uninitialized {
            ctx.taint(width)
        } else {
            ctx.zero(width)
        }
    }

    fn input_port(&self, ctx: &mut Context) -> ExprRef {
        ctx.bv_symbol(INGRESS_PORT, PORT_WIDTH)
    }

    fn output_port(&self, ctx: &mut Context, state: &ExecutionState) -> ExprRef {
        state
            .try_get(&format!("{STANDARD_METADATA}.egress_port"))
            .unwrap_or_else(|| ctx.zero(PORT_WIDTH))
    }

    fn drop_predicate(&self, ctx: &mut Context, state: &ExecutionState) -> ExprRef {
        match state.try_get(&format!("{STANDARD_METADATA}.egress_spec")) {
            Some(spec) => {
                let drop_port = ctx.bv_lit(self.config.drop_port, PORT_WIDTH);
                ctx.bv_equal(spec, drop_port)
            }
            None => ctx.fals(),
        }
    }

    fn register_externs(&self, registry: &mut ExternRegistry) {
        registry.register(TRAFFIC_MANAGER, traffic_manager);
        registry.register("mark_to_drop", mark_to_drop);
        registry.register("clone", clone);
        registry.register("random", random);
    }

    fn param_policy(&self, _block: &str, param: &Param) -> ParamPolicy {
        if is_standard_metadata(&param.tpe) {
            ParamPolicy::PassThrough
        } else {
            ParamPolicy::Direction
        }
    }

    fn zero_width_output(&self) -> Option<(BitVecValue, BitVecValue)> {
        Some((
            BitVecValue::from_u64(self.config.zero_width_sentinel, self.config.zero_width_bits),
            BitVecValue::from_u64(self.config.zero_width_mask, self.config.zero_width_bits),
        ))
    }

    fn packet_len_bounds(&self) -> (WidthInt, WidthInt) {
        (self.config.min_packet_bits, self.config.max_packet_bits)
    }
}

/// Drops the packet if ingress selected the drop port, otherwise forwards it to the
/// selected egress port.
fn traffic_manager<'p>(
    env: &StepEnv<'p>,
    ctx: &mut Context,
    _call: &ExternCall<'p>,
    mut state: ExecutionState<'p>,
) -> Vec<Successor<'p>> {
    let dropped = env.target.drop_predicate(ctx, &state);
    let forwarded = ctx.not(dropped);
    let mut drop = state.clone();
    drop.push_command(Command::Exception(ExceptionKind::Drop));
    let spec = state.get(&format!("{STANDARD_METADATA}.egress_spec"));
    state.bind(format!("{STANDARD_METADATA}.egress_port"), spec);
    vec![
        Successor::guarded(drop, dropped),
        Successor::guarded(state, forwarded),
    ]
}

fn mark_to_drop<'p>(
    _env: &StepEnv<'p>,
    _ctx: &mut Context,
    call: &ExternCall<'p>,
    mut state: ExecutionState<'p>,
) -> Vec<Successor<'p>> {
    let drop_port = state.get(DROP_PORT);
    let metadata = call.path_arg(&state, 0);
    state.bind(format!("{metadata}.egress_spec"), drop_port);
    vec![Successor::new(state)]
}

/// `clone(type, session)` records the clone session that the control plane has to set up.
fn clone<'p>(
    env: &StepEnv<'p>,
    ctx: &mut Context,
    call: &ExternCall<'p>,
    mut state: ExecutionState<'p>,
) -> Vec<Successor<'p>> {
    assert_eq!(call.args.len(), 2, "clone expects a type and a session");
    let clone_type = crate::exec::lower(ctx, env.program, &state, &call.args[0]);
    let session = crate::exec::lower(ctx, env.program, &state, &call.args[1]);
    let key = match session.get_bv_lit(ctx) {
        Some(id) => id.to_string(),
        None => {
            let existing = state
                .objects()
                .find(|(category, _)| category.as_str() == CLONE_INFOS)
                .map_or(0, |(_, objects)| objects.len());
            format!("session{existing}")
        }
    };
    state.set_object(
        CLONE_INFOS,
        &key,
        TestObject::CloneInfo {
            session,
            clone_type,
        },
    );
    vec![Successor::new(state)]
}

/// `random(result, lo, hi)` writes an arbitrary value to `result`.
fn random<'p>(
    env: &StepEnv<'p>,
    ctx: &mut Context,
    call: &ExternCall<'p>,
    mut state: ExecutionState<'p>,
) -> Vec<Successor<'p>> {
    let result = call.path_arg(&state, 0);
    let width = state.get(&result).get_width(ctx);
    let value = env.target.create_uninitialized(ctx, width, true);
    state.bind(result, value);
    vec![Successor::new(state)]
}
