// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Generates packet tests for data-plane programs by symbolic execution.
//!
//! A [`target::Target`] turns a [`program::Program`] into a sequence of [`exec::Command`]s.
//! The [`exec::SymbolicExecutor`] steps through them, forks at every branch, and asks a
//! [`smt::Solver`] for concrete inputs once a path ends. Every feasible path becomes a
//! [`testspec::TestSpec`].

pub mod error;
pub mod exec;
pub mod ir;
pub mod program;
pub mod smt;
pub mod target;
pub mod testspec;
