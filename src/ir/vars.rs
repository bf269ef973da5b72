// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Deterministic names for state variables.
//!
//! Program variables use their dotted access path (`hdr.eth.dst`). Everything the engine
//! synthesizes lives in a namespace starting with `*` or contains a `$` component. Neither
//! character can occur in a program identifier, so synthetic names never collide with
//! program variables.

use crate::ir::{Context, ExprRef, WidthInt};

/// Width of packet-length variables.
pub const PACKET_LEN_WIDTH: WidthInt = 32;

/// Symbolic length of the ingress packet in bits.
pub const PACKET_LEN: &str = "*packet_len";

/// Error raised by the parser, as a value of the `error` type.
pub const PARSER_ERROR: &str = "*parser_error";

/// Validity flag of a header instance.
pub fn validity_name(path: &str) -> String {
    format!("{path}.$valid")
}

/// Set to true by a table application that hit an entry.
pub fn table_hit_name(table: &str) -> String {
    format!("{table}.$hit")
}

/// Holds the index of the action that a table application executed.
pub fn table_action_run_name(table: &str) -> String {
    format!("{table}.$action_run")
}

/// A bookkeeping ("zombie") variable that belongs to one application of a table.
/// Different incarnations of the same table never share variables.
pub fn zombie_table_name(table: &str, incarnation: u32, name: &str, indices: &[u32]) -> String {
    let mut out = format!("*table.{table}.{incarnation}.{name}");
    for ii in indices {
        out.push('.');
        out.push_str(&ii.to_string());
    }
    out
}

/// Prefix of the parameters and locals of one invocation of an action or function.
pub fn call_scope_name(callee: &str, incarnation: u32) -> String {
    format!("*call.{callee}.{incarnation}")
}

/// A chunk of input packet starting at `cursor` bits.
pub fn packet_chunk_name(cursor: WidthInt, width: WidthInt) -> String {
    format!("*packet.{cursor}.{width}")
}

/// Target specific variables that are not visible to the program.
pub fn arch_name(name: &str) -> String {
    format!("*{name}")
}

/// Returns true iff `name` was generated by the engine.
pub fn is_synthetic(name: &str) -> bool {
    name.starts_with('*') || name.contains(".$")
}

pub fn packet_len(ctx: &mut Context) -> ExprRef {
    ctx.bv_symbol(PACKET_LEN, PACKET_LEN_WIDTH)
}
