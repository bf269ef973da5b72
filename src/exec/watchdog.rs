// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Cooperative cancellation of the exploration loop. The scheduler polls the watchdog
//! before dequeuing a state, so a stop request never interrupts a step that is in flight.

use std::fmt::Debug;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_POLL_EVERY: usize = 64;

pub type DynWatchdog = Rc<dyn Watchdog>;

pub trait Watchdog: Debug {
    /// Returns true once exploration should stop starting new steps.
    #[must_use]
    fn should_stop(&self) -> bool;

    /// Number of scheduler iterations between two polls.
    #[must_use]
    fn poll_every(&self) -> usize;
}

/// Never stops the exploration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LazyWatchdog;

impl LazyWatchdog {
    #[must_use]
    pub fn in_rc(self) -> DynWatchdog {
        Rc::new(self)
    }
}

impl Watchdog for LazyWatchdog {
    fn should_stop(&self) -> bool {
        false
    }

    fn poll_every(&self) -> usize {
        usize::MAX
    }
}

/// Stops the exploration once the shared flag is set, e.g., from a signal handler or
/// another thread.
#[derive(Clone, Debug)]
pub struct FlagWatchdog {
    flag: Arc<AtomicBool>,
    poll_every: usize,
}

impl FlagWatchdog {
    #[must_use]
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self {
            flag,
            poll_every: DEFAULT_POLL_EVERY,
        }
    }

    #[must_use]
    pub fn polling_every(mut self, iterations: usize) -> Self {
        assert!(iterations > 0, "polling interval needs to be positive");
        self.poll_every = iterations;
        self
    }

    #[must_use]
    pub fn in_rc(self) -> DynWatchdog {
        Rc::new(self)
    }
}

impl Watchdog for FlagWatchdog {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn poll_every(&self) -> usize {
        self.poll_every
    }
}
