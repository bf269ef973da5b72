// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

mod enumerate;
mod model;
mod parse;
mod serialize;
mod solver;

pub use enumerate::{EnumerationSolver, DEFAULT_MAX_FREE_BITS};
pub use model::Model;
pub use parse::parse_smt_bit_vec;
pub use serialize::{convert_expr, convert_tpe, escape_smt_identifier, taint_smt_name};
pub use solver::{
    SatResult, SmtSolver, SmtSolverCmd, SmtSolverOptions, Solver, BITWUZLA_CMD, YICES2_CMD,
    Z3_CMD,
};
