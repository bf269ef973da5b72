// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Symbolic execution of programs: commands, states, the stepper and the scheduler.

mod continuation;
mod explore;
mod externs;
mod lower;
mod state;
mod stepper;
mod table;
mod watchdog;

pub use continuation::{Command, ContinuationStack, ExceptionKind, Handlers, Scope, Termination};
pub use explore::{build_test, ExplorationOptions, ExplorationStats, Strategy, SymbolicExecutor};
pub use externs::{ExternCall, ExternHandler, ExternRegistry};
pub use lower::lower;
pub use state::{copy_in_copy_out, CallArg, ExecutionState, PacketBuffer, TraceEvent};
pub use stepper::{step, StepEnv, Successor};
pub use table::{action_index, action_name, ACTION_PROFILES, ACTION_RUN_WIDTH, ACTION_SELECTORS, TABLE_CONFIGS};
pub use watchdog::{DynWatchdog, FlagWatchdog, LazyWatchdog, Watchdog, DEFAULT_POLL_EVERY};
