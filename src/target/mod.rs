// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Everything the engine needs to know about the architecture a program runs on.

mod v1model;

pub use v1model::{V1Model, V1ModelConfig};

use crate::exec::{Command, ExecutionState, ExternRegistry};
use crate::ir::{Context, ExprRef, WidthInt};
use crate::program::{Param, Program};
use baa::BitVecValue;

/// How the arguments of a pipeline block parameter are passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamPolicy {
    /// copy-in and copy-out as the parameter direction says
    Direction,
    /// the parameter starts out with default values, even if it is `inout`
    ResetOnly,
    /// the block works on the caller's value, independent of the declared direction
    PassThrough,
}

pub trait Target {
    fn name(&self) -> &str;

    /// Commands that run the pipeline of `program`. Executing them needs a state prepared
    /// by [`Target::initialize`].
    fn pipeline<'p>(&self, program: &'p Program) -> Vec<Command<'p>>;

    /// Declares the architecture variables that the pipeline passes to its blocks.
    fn initialize<'p>(&self, program: &'p Program, ctx: &mut Context, state: &mut ExecutionState<'p>);

    /// Value of storage that was never written. `force_taint` requests a taint value
    /// independent of the configured policy.
    fn create_uninitialized(&self, ctx: &mut Context, width: WidthInt, force_taint: bool) -> ExprRef;

    /// The port that the packet arrives on.
    fn input_port(&self, ctx: &mut Context) -> ExprRef;

    /// The port that the packet leaves on at the end of `state`.
    fn output_port(&self, ctx: &mut Context, state: &ExecutionState) -> ExprRef;

    /// Holds iff the packet of `state` was dropped.
    fn drop_predicate(&self, ctx: &mut Context, state: &ExecutionState) -> ExprRef;

    /// Adds the externs of this architecture.
    fn register_externs(&self, registry: &mut ExternRegistry);

    fn param_policy(&self, _block: &str, _param: &Param) -> ParamPolicy {
        ParamPolicy::Direction
    }

    /// Value and taint mask that replace an empty output packet.
    fn zero_width_output(&self) -> Option<(BitVecValue, BitVecValue)> {
        None
    }

    /// Inclusive range of input packet lengths in bits.
    fn packet_len_bounds(&self) -> (WidthInt, WidthInt);
}
