// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

/// Errors that can happen while talking to an external solver.
///
/// Violations of engine invariants (missing declarations, unregistered externs, stale models)
/// are programming errors and panic instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to communicate with the SMT solver: {0}")]
    Solver(#[from] std::io::Error),
    #[error("unexpected response from the SMT solver: {0}")]
    UnexpectedSolverResponse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
