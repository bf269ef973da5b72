// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

mod context;
mod eval;
mod expr;
mod serialize;
mod simplify;
mod taint;
mod traversal;
mod type_check;
pub mod vars;

pub use context::{Context, StringRef};
pub use eval::{eval_bv_expr, GetExprValue};
pub use expr::{bv_mask_value, bv_value_fits_width, BVLiteralInt, Expr, ExprRef, WidthInt};
pub use serialize::SerializableIrNode;
pub use simplify::simplify_single_expression;
pub use taint::{is_tainted, taint_mask};
pub use traversal::{bottom_up, collect_leaves, collect_symbols, ForEachChild};
pub use type_check::{TypeCheck, TypeCheckError};
