// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::exec::continuation::{Command, ContinuationStack, ExceptionKind, Scope, Termination};
use crate::ir::{vars, Context, ExprRef, TypeCheck, WidthInt};
use crate::program::{Direction, P4Type, Param, Program, Stmt, TypeKind};
use crate::target::{ParamPolicy, Target};
use crate::testspec::TestObject;
use im::{OrdMap, Vector};
use std::fmt::{Display, Formatter};

/// Human readable record of what happened along a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    ParserState { parser: String, state: String },
    Branch { cond: String, taken: bool },
    TableHit { table: String, action: String },
    TableMiss { table: String, action: String },
    Extract { header: String, cursor: WidthInt, width: WidthInt },
    Emit { header: String },
    ExternCall { name: String },
    Exception(ExceptionKind),
}

impl Display for TraceEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceEvent::ParserState { parser, state } => write!(f, "[parser] {parser}.{state}"),
            TraceEvent::Branch { cond, taken } => write!(f, "[branch] {cond} is {taken}"),
            TraceEvent::TableHit { table, action } => write!(f, "[table] {table} hit: {action}"),
            TraceEvent::TableMiss { table, action } => {
                write!(f, "[table] {table} miss: {action}")
            }
            TraceEvent::Extract {
                header,
                cursor,
                width,
            } => write!(f, "[extract] {header} at bit {cursor} ({width} bits)"),
            TraceEvent::Emit { header } => write!(f, "[emit] {header}"),
            TraceEvent::ExternCall { name } => write!(f, "[extern] {name}"),
            TraceEvent::Exception(kind) => write!(f, "[exception] {kind}"),
        }
    }
}

/// Bits consumed from the ingress packet and bits emitted to the egress packet.
#[derive(Debug, Clone, Default)]
pub struct PacketBuffer {
    /// number of bits consumed by the parser
    pub cursor: WidthInt,
    /// chunks of the input packet, in wire order
    pub input: Vector<ExprRef>,
    /// emitted fields, in wire order
    pub emit: Vector<ExprRef>,
    /// true once the bounds of the symbolic packet length were added to the path constraints
    pub len_constrained: bool,
}

impl PacketBuffer {
    pub fn emit_width(&self, ctx: &Context) -> WidthInt {
        self.emit.iter().map(|e| e.get_width(ctx)).sum()
    }
}

/// Argument of a call, as seen by the copy-in/copy-out machinery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    /// location of an l-value of the caller
    Path(String),
    Value(ExprRef),
}

/// Builds the commands that run before (copy-in) and after (copy-out) a callee with `params`.
/// With a `scope`, parameters are declared in it instead of under their plain names.
pub fn copy_in_copy_out<'p>(
    mut scope: Option<&mut Scope>,
    params: &[Param],
    args: Vec<CallArg>,
    policy: impl Fn(&Param) -> ParamPolicy,
) -> (Vec<Command<'p>>, Vec<Command<'p>>) {
    assert_eq!(
        params.len(),
        args.len(),
        "expected {} arguments, got {}",
        params.len(),
        args.len()
    );
    let mut copy_in = vec![];
    let mut copy_out = vec![];
    for (param, arg) in params.iter().zip(args) {
        let location = match scope.as_mut() {
            Some(scope) => scope.declare(&param.name),
            None => param.name.clone(),
        };
        copy_in.push(Command::Declare {
            path: location.clone(),
            tpe: param.tpe.clone(),
        });
        let policy = policy(param);
        let direction = match policy {
            ParamPolicy::PassThrough => Direction::InOut,
            _ => param.direction,
        };
        let reads = policy != ParamPolicy::ResetOnly
            && matches!(direction, Direction::In | Direction::InOut | Direction::None);
        let writes = matches!(direction, Direction::Out | Direction::InOut);
        if reads {
            copy_in.push(match &arg {
                CallArg::Path(src) => Command::Copy {
                    dst: location.clone(),
                    src: src.clone(),
                },
                CallArg::Value(value) => Command::Bind {
                    dst: location.clone(),
                    value: *value,
                },
            });
        }
        if writes {
            match arg {
                CallArg::Path(dst) => copy_out.push(Command::Copy { dst, src: location }),
                CallArg::Value(_) => panic!(
                    "argument for `{}` parameter `{}` needs to be an l-value",
                    if direction == Direction::Out { "out" } else { "inout" },
                    param.name
                ),
            }
        }
    }
    (copy_in, copy_out)
}

/// Everything there is to know about one explored path prefix.
///
/// Cloning is cheap: all collections are persistent and share structure with the clone.
#[derive(Debug, Clone)]
pub struct ExecutionState<'p> {
    /// current value of every declared scalar leaf
    store: OrdMap<String, ExprRef>,
    /// types of declared variables and of all of their sub-paths
    types: OrdMap<String, P4Type>,
    /// conjunction of conditions that need to hold for this path, append-only
    constraints: Vector<ExprRef>,
    pub(crate) stack: ContinuationStack<'p>,
    pub packet: PacketBuffer,
    objects: OrdMap<String, OrdMap<String, TestObject<ExprRef>>>,
    trace: Vector<TraceEvent>,
    incarnation: u32,
    steps: u64,
    forks: u64,
    termination: Option<Termination>,
}

impl<'p> ExecutionState<'p> {
    pub fn new(commands: impl IntoIterator<Item = Command<'p>>) -> Self {
        Self {
            store: OrdMap::new(),
            types: OrdMap::new(),
            constraints: Vector::new(),
            stack: ContinuationStack::new(commands),
            packet: PacketBuffer::default(),
            objects: OrdMap::new(),
            trace: Vector::new(),
            incarnation: 0,
            steps: 0,
            forks: 0,
            termination: None,
        }
    }

    /// Location of the program path `path` in the store. Parameters and locals of the action
    /// or function that is currently executing shadow everything else.
    pub fn resolve(&self, path: &str) -> String {
        self.stack.resolve(path)
    }

    /// Location for a new local variable `name` of the code that is currently executing.
    pub fn declare_local(&mut self, name: &str) -> String {
        self.stack.declare_local(name)
    }

    /// Pushes an invocation of the action or function `callee`. Its parameters and locals
    /// live in a fresh scope, so they never touch caller variables with the same name.
    /// `args` and `result` are locations in the caller.
    pub fn push_call(
        &mut self,
        callee: &str,
        params: &[Param],
        body: &'p [Stmt],
        args: Vec<CallArg>,
        result: Option<String>,
    ) {
        let mut scope = Scope::new(vars::call_scope_name(callee, self.next_incarnation()));
        let (copy_in, copy_out) =
            copy_in_copy_out(Some(&mut scope), params, args, |_| ParamPolicy::Direction);
        let call = Command::Call {
            body: Command::stmts(body),
            result,
            scope: Some(scope),
        };
        self.push_commands(copy_in.into_iter().chain([call]).chain(copy_out));
    }

    pub fn try_get(&self, path: &str) -> Option<ExprRef> {
        self.store.get(path).copied()
    }

    /// Current value of a scalar leaf. Panics if `path` was never declared or bound.
    pub fn get(&self, path: &str) -> ExprRef {
        self.try_get(path).unwrap_or_else(|| {
            let recent: Vec<String> = self
                .trace
                .iter()
                .rev()
                .take(5)
                .map(|e| e.to_string())
                .collect();
            panic!(
                "read of undeclared variable `{path}`. Most recent events: {}",
                recent.join("; ")
            )
        })
    }

    pub fn bind(&mut self, path: impl Into<String>, value: ExprRef) {
        self.store.insert(path.into(), value);
    }

    pub fn type_of(&self, path: &str) -> Option<&P4Type> {
        self.types.get(path)
    }

    /// Creates `path` and all of its leaves. Header instances start out invalid, every other
    /// leaf is set to the default value chosen by the target.
    pub fn declare(
        &mut self,
        ctx: &mut Context,
        program: &Program,
        target: &dyn Target,
        path: &str,
        tpe: &P4Type,
    ) {
        self.types.insert(path.to_string(), tpe.clone());
        match tpe {
            P4Type::Named(name) => {
                let decl = program.find_type(name);
                for field in decl.fields.iter() {
                    let field_path = format!("{path}.{}", field.name);
                    self.declare(ctx, program, target, &field_path, &field.tpe);
                }
                if decl.kind == TypeKind::Header {
                    let invalid = ctx.fals();
                    self.bind(vars::validity_name(path), invalid);
                }
            }
            P4Type::Extern(_) => {}
            scalar => {
                let width = scalar.scalar_width().unwrap_or_else(|| unreachable!());
                let value = target.create_uninitialized(ctx, width, false);
                self.bind(path, value);
            }
        }
    }

    /// Leaves at or below `path`, in lexicographic order.
    pub fn leaves_below<'a>(&'a self, path: &'a str) -> impl Iterator<Item = (&'a str, ExprRef)> {
        let prefix = format!("{path}.");
        self.store
            .range(path.to_string()..)
            .take_while(move |(k, _)| k.starts_with(path))
            .filter(move |(k, _)| k.as_str() == path || k.starts_with(&prefix))
            .map(|(k, v)| (k.as_str(), *v))
    }

    /// Copies every leaf at or below `src` to the same relative position below `dst`.
    pub fn copy(&mut self, dst: &str, src: &str) {
        let updates: Vec<(String, ExprRef)> = self
            .leaves_below(src)
            .map(|(leaf, value)| (format!("{dst}{}", &leaf[src.len()..]), value))
            .collect();
        for (leaf, value) in updates {
            self.bind(leaf, value);
        }
        if let Some(tpe) = self.types.get(src).cloned() {
            self.types.entry(dst.to_string()).or_insert(tpe);
        }
    }

    /// Adds a condition to the path. Literal `true` conditions are skipped.
    pub fn add_constraint(&mut self, ctx: &Context, cond: ExprRef) {
        debug_assert!(cond.is_bool(ctx), "path constraints need to be boolean");
        if cond.get_bool_lit(ctx) != Some(true) {
            self.constraints.push_back(cond);
        }
    }

    pub fn constraints(&self) -> impl Iterator<Item = ExprRef> + '_ {
        self.constraints.iter().copied()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn add_trace(&mut self, event: TraceEvent) {
        log::trace!("{event}");
        self.trace.push_back(event);
    }

    pub fn trace(&self) -> impl Iterator<Item = &TraceEvent> {
        self.trace.iter()
    }

    pub fn object(&self, category: &str, name: &str) -> Option<&TestObject<ExprRef>> {
        self.objects.get(category).and_then(|c| c.get(name))
    }

    pub fn set_object(&mut self, category: &str, name: &str, obj: TestObject<ExprRef>) {
        self.objects
            .entry(category.to_string())
            .or_insert_with(OrdMap::new)
            .insert(name.to_string(), obj);
    }

    pub fn objects(
        &self,
    ) -> impl Iterator<Item = (&String, &OrdMap<String, TestObject<ExprRef>>)> {
        self.objects.iter()
    }

    /// Returns a number that was never returned before on this path.
    pub fn next_incarnation(&mut self) -> u32 {
        let inc = self.incarnation;
        self.incarnation += 1;
        inc
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn count_step(&mut self) {
        self.steps += 1;
    }

    pub fn forks(&self) -> u64 {
        self.forks
    }

    pub(crate) fn count_fork(&mut self) {
        self.forks += 1;
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn is_terminal(&self) -> bool {
        self.termination.is_some()
    }

    pub(crate) fn terminate(&mut self, termination: Termination) {
        debug_assert!(self.termination.is_none(), "path already terminated");
        self.termination = Some(termination);
    }

    pub fn push_command(&mut self, cmd: Command<'p>) {
        self.stack.push(cmd);
    }

    pub fn push_commands(&mut self, cmds: impl IntoIterator<Item = Command<'p>>) {
        self.stack.push_all(cmds);
    }

    /// Raises a program exception, terminating the path if nobody handles it.
    pub fn raise(&mut self, kind: ExceptionKind) {
        self.add_trace(TraceEvent::Exception(kind));
        if let Err(kind) = self.stack.raise(kind) {
            self.terminate(Termination::Exception(kind));
        }
    }

    pub fn next_command(&self) -> Option<&Command<'p>> {
        self.stack.peek()
    }
}
