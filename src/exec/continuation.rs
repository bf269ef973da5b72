// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Pending computation represented as data. Suspending or forking an execution only
//! requires cloning a [`ContinuationStack`].

use crate::ir::ExprRef;
use crate::program::{MethodCall, P4Type, PExpr, Parser, Stmt, SwitchCase, Table, Transition};
use im::{OrdMap, Vector};
use std::fmt::{Display, Formatter};

/// Program level exceptions. These are ordinary data and have nothing to do with panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExceptionKind {
    /// `exit` statement
    Exit,
    /// parser transitioned to `reject` or a `verify` failed
    Reject,
    PacketTooShort,
    /// no `select` case matched
    NoMatch,
    /// the target dropped the packet
    Drop,
    /// the target gave up on this path, no test is produced
    Abort,
}

impl Display for ExceptionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExceptionKind::Exit => "exit",
            ExceptionKind::Reject => "reject",
            ExceptionKind::PacketTooShort => "packet too short",
            ExceptionKind::NoMatch => "no match",
            ExceptionKind::Drop => "drop",
            ExceptionKind::Abort => "abort",
        };
        write!(f, "{name}")
    }
}

/// How a path ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// all commands were executed
    Normal,
    /// an exception reached the outermost frame
    Exception(ExceptionKind),
}

impl Display for Termination {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Normal => write!(f, "normal"),
            Termination::Exception(kind) => write!(f, "exception: {kind}"),
        }
    }
}

pub type Handlers<'p> = OrdMap<ExceptionKind, Vector<Command<'p>>>;

#[derive(Debug, Clone)]
pub enum Command<'p> {
    Stmt(&'p Stmt),
    /// an `if` whose condition still has to be evaluated
    Branch {
        cond: &'p PExpr,
        tru: &'p Stmt,
        fals: Option<&'p Stmt>,
    },
    /// creates all leaves of `path` with default values
    Declare { path: String, tpe: P4Type },
    /// copies every leaf below `src` to the corresponding leaf below `dst`
    Copy { dst: String, src: String },
    Bind { dst: String, value: ExprRef },
    /// runs `body` in a new frame; a `return` binds its value to `result`
    Call {
        body: Vector<Command<'p>>,
        result: Option<String>,
        scope: Option<Scope>,
    },
    /// runs `body` in a new frame that handles the exceptions in `handlers`
    Trap {
        body: Vector<Command<'p>>,
        handlers: Handlers<'p>,
    },
    Return(Option<ExprRef>),
    Exception(ExceptionKind),
    MethodCall {
        call: &'p MethodCall,
        result: Option<&'p str>,
    },
    ParserState {
        parser: &'p Parser,
        state: &'p str,
    },
    Transition {
        parser: &'p Parser,
        transition: &'p Transition,
    },
    TableApply(&'p Table),
    /// executes the switch case that belongs to the action of the last application of `table`
    SwitchActionRun {
        table: &'p Table,
        cases: &'p [SwitchCase],
    },
    /// a target specific step, dispatched through the extern registry
    Hook(String),
}

impl<'p> Command<'p> {
    pub fn stmts(stmts: &'p [Stmt]) -> Vector<Command<'p>> {
        stmts.iter().map(Command::Stmt).collect()
    }
}

/// The names that belong to one invocation of an action or function and where they live
/// in the store. Names that are not part of a scope refer to the enclosing block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    prefix: String,
    names: OrdMap<String, String>,
}

impl Scope {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            names: OrdMap::new(),
        }
    }

    /// Makes `name` local to this scope and returns its location.
    pub fn declare(&mut self, name: &str) -> String {
        let location = format!("{}.{name}", self.prefix);
        self.names.insert(name.to_string(), location.clone());
        location
    }

    /// Location of `path` if its first component is local to this scope.
    pub fn resolve(&self, path: &str) -> Option<String> {
        let (head, rest) = match path.find('.') {
            Some(dot) => path.split_at(dot),
            None => (path, ""),
        };
        self.names.get(head).map(|location| format!("{location}{rest}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Call,
    Trap,
}

#[derive(Debug, Clone)]
pub struct Frame<'p> {
    body: Vector<Command<'p>>,
    handlers: Handlers<'p>,
    kind: FrameKind,
    result: Option<String>,
    scope: Option<Scope>,
}

/// A stack of frames, each with a sequence of pending commands. The innermost frame is
/// last.
#[derive(Debug, Clone, Default)]
pub struct ContinuationStack<'p> {
    frames: Vec<Frame<'p>>,
}

impl<'p> ContinuationStack<'p> {
    pub fn new(commands: impl IntoIterator<Item = Command<'p>>) -> Self {
        Self {
            frames: vec![Frame {
                body: commands.into_iter().collect(),
                handlers: OrdMap::new(),
                kind: FrameKind::Trap,
                result: None,
                scope: None,
            }],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.iter().all(|f| f.body.is_empty())
    }

    /// Inserts `cmd` before all pending commands of the current frame.
    pub fn push(&mut self, cmd: Command<'p>) {
        self.current().body.push_front(cmd);
    }

    /// Inserts `cmds` in order before all pending commands of the current frame.
    pub fn push_all(&mut self, cmds: impl IntoIterator<Item = Command<'p>>) {
        let mut cmds: Vector<Command<'p>> = cmds.into_iter().collect();
        let frame = self.current();
        cmds.append(std::mem::take(&mut frame.body));
        frame.body = cmds;
    }

    fn current(&mut self) -> &mut Frame<'p> {
        self.frames
            .last_mut()
            .unwrap_or_else(|| panic!("no active frame, the program already terminated"))
    }

    pub fn enter_call(
        &mut self,
        body: Vector<Command<'p>>,
        result: Option<String>,
        scope: Option<Scope>,
    ) {
        self.frames.push(Frame {
            body,
            handlers: OrdMap::new(),
            kind: FrameKind::Call,
            result,
            scope,
        });
    }

    pub fn enter_trap(&mut self, body: Vector<Command<'p>>, handlers: Handlers<'p>) {
        self.frames.push(Frame {
            body,
            handlers,
            kind: FrameKind::Trap,
            result: None,
            scope: None,
        });
    }

    fn innermost_call(&mut self) -> Option<&mut Frame<'p>> {
        self.frames.iter_mut().rev().find(|f| f.kind == FrameKind::Call)
    }

    /// Location of `path` in the store, as seen from the innermost call frame.
    pub fn resolve(&self, path: &str) -> String {
        self.frames
            .iter()
            .rev()
            .find(|f| f.kind == FrameKind::Call)
            .and_then(|f| f.scope.as_ref())
            .and_then(|s| s.resolve(path))
            .unwrap_or_else(|| path.to_string())
    }

    /// Location of a local variable `name` declared by the current command. Locals of
    /// actions and functions go into the scope of their invocation.
    pub fn declare_local(&mut self, name: &str) -> String {
        match self.innermost_call().and_then(|f| f.scope.as_mut()) {
            Some(scope) => scope.declare(name),
            None => name.to_string(),
        }
    }

    /// The next command without removing it.
    pub fn peek(&self) -> Option<&Command<'p>> {
        self.frames.iter().rev().find_map(|f| f.body.front())
    }

    /// Removes the next command. Frames without pending commands are left.
    /// Returns `None` once all frames are done, which is normal termination.
    pub fn pop(&mut self) -> Option<Command<'p>> {
        while let Some(frame) = self.frames.last_mut() {
            if let Some(cmd) = frame.body.pop_front() {
                return Some(cmd);
            }
            self.frames.pop();
        }
        None
    }

    /// Unwinds to the innermost frame with a handler for `kind` and replaces its pending
    /// commands with the handler. Without a handler, all frames are removed and `kind` is
    /// returned as the reason for termination.
    pub fn raise(&mut self, kind: ExceptionKind) -> Result<(), ExceptionKind> {
        match self
            .frames
            .iter()
            .rposition(|f| f.handlers.contains_key(&kind))
        {
            Some(index) => {
                self.frames.truncate(index + 1);
                let frame = &mut self.frames[index];
                frame.body = frame.handlers[&kind].clone();
                frame.handlers = OrdMap::new();
                Ok(())
            }
            None => {
                self.frames.clear();
                Err(kind)
            }
        }
    }

    /// Leaves the innermost call frame. Returns where the caller expects the return value.
    pub fn ret(&mut self) -> Option<String> {
        let index = self
            .frames
            .iter()
            .rposition(|f| f.kind == FrameKind::Call)
            .unwrap_or_else(|| panic!("return outside of a call frame"));
        let result = self.frames[index].result.clone();
        self.frames.truncate(index);
        result
    }
}
