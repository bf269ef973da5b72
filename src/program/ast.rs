// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::ir::{BVLiteralInt, WidthInt};

/// Width used to represent values of the `error` type.
pub const ERROR_WIDTH: WidthInt = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum P4Type {
    Bits(WidthInt),
    Bool,
    Error,
    /// a header or struct declared in [`crate::program::Program::types`]
    Named(String),
    /// an extern object like `packet_in`
    Extern(String),
}

impl P4Type {
    pub fn named(name: &str) -> Self {
        P4Type::Named(name.to_string())
    }

    /// Width of a scalar type.
    pub fn scalar_width(&self) -> Option<WidthInt> {
        match self {
            P4Type::Bits(w) => Some(*w),
            P4Type::Bool => Some(1),
            P4Type::Error => Some(ERROR_WIDTH),
            P4Type::Named(_) | P4Type::Extern(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Header,
    Struct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub tpe: P4Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    pub fields: Vec<Field>,
}

impl TypeDecl {
    pub fn header(name: &str, fields: &[(&str, WidthInt)]) -> Self {
        Self {
            name: name.to_string(),
            kind: TypeKind::Header,
            fields: fields
                .iter()
                .map(|(n, w)| Field {
                    name: n.to_string(),
                    tpe: P4Type::Bits(*w),
                })
                .collect(),
        }
    }

    pub fn structure(name: &str, fields: &[(&str, P4Type)]) -> Self {
        Self {
            name: name.to_string(),
            kind: TypeKind::Struct,
            fields: fields
                .iter()
                .map(|(n, t)| Field {
                    name: n.to_string(),
                    tpe: t.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// logical negation of a `bool`
    Not,
    /// bitwise complement
    BitNot,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PExpr {
    /// dotted access path, e.g., `hdr.eth.dst`
    Path(String),
    Const {
        value: BVLiteralInt,
        width: WidthInt,
    },
    Bool(bool),
    Unary(UnOp, Box<PExpr>),
    Binary(BinOp, Box<PExpr>, Box<PExpr>),
    Slice {
        e: Box<PExpr>,
        hi: WidthInt,
        lo: WidthInt,
    },
    Concat(Box<PExpr>, Box<PExpr>),
    /// `hdr.isValid()`
    IsValid(String),
    /// `table.apply().hit`
    TableHit(String),
    /// `error.<name>`
    ErrorConst(String),
}

impl PExpr {
    pub fn path(p: &str) -> Self {
        PExpr::Path(p.to_string())
    }

    pub fn bits(value: BVLiteralInt, width: WidthInt) -> Self {
        PExpr::Const { value, width }
    }

    pub fn bin(op: BinOp, a: PExpr, b: PExpr) -> Self {
        PExpr::Binary(op, Box::new(a), Box::new(b))
    }

    pub fn not(e: PExpr) -> Self {
        PExpr::Unary(UnOp::Not, Box::new(e))
    }

    /// Calls `f` on all tables applied by this expression.
    pub fn for_each_table_hit(&self, f: &mut impl FnMut(&str)) {
        match self {
            PExpr::TableHit(t) => f(t),
            PExpr::Unary(_, e) | PExpr::Slice { e, .. } => e.for_each_table_hit(f),
            PExpr::Binary(_, a, b) | PExpr::Concat(a, b) => {
                a.for_each_table_hit(f);
                b.for_each_table_hit(f);
            }
            PExpr::Path(_)
            | PExpr::Const { .. }
            | PExpr::Bool(_)
            | PExpr::IsValid(_)
            | PExpr::ErrorConst(_) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    /// object that the method is invoked on, e.g., `pkt` in `pkt.extract(hdr.eth)`
    pub receiver: Option<String>,
    pub method: String,
    pub args: Vec<PExpr>,
}

impl MethodCall {
    pub fn new(receiver: Option<&str>, method: &str, args: Vec<PExpr>) -> Self {
        Self {
            receiver: receiver.map(|r| r.to_string()),
            method: method.to_string(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchLabel {
    Action(String),
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCase {
    pub label: SwitchLabel,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Declare {
        name: String,
        tpe: P4Type,
        init: Option<PExpr>,
    },
    Assign {
        lhs: String,
        rhs: PExpr,
    },
    If {
        cond: PExpr,
        tru: Box<Stmt>,
        fals: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    /// a call to an action, function or extern, optionally assigning the result
    Call {
        call: MethodCall,
        result: Option<String>,
    },
    Apply(String),
    /// `switch (table.apply().action_run)`
    Switch {
        table: String,
        cases: Vec<SwitchCase>,
    },
    Return(Option<PExpr>),
    Exit,
    /// `verify(cond, error.<name>)`
    Verify {
        cond: PExpr,
        error: String,
    },
}

impl Stmt {
    pub fn assign(lhs: &str, rhs: PExpr) -> Self {
        Stmt::Assign {
            lhs: lhs.to_string(),
            rhs,
        }
    }

    pub fn if_then(cond: PExpr, tru: Stmt) -> Self {
        Stmt::If {
            cond,
            tru: Box::new(tru),
            fals: None,
        }
    }

    pub fn if_else(cond: PExpr, tru: Stmt, fals: Stmt) -> Self {
        Stmt::If {
            cond,
            tru: Box::new(tru),
            fals: Some(Box::new(fals)),
        }
    }

    pub fn call(receiver: Option<&str>, method: &str, args: Vec<PExpr>) -> Self {
        Stmt::Call {
            call: MethodCall::new(receiver, method, args),
            result: None,
        }
    }

    /// Number of statements including nested ones.
    pub fn count(&self) -> usize {
        1 + match self {
            Stmt::If { tru, fals, .. } => tru.count() + fals.as_ref().map_or(0, |f| f.count()),
            Stmt::Block(stmts) => stmts.iter().map(Stmt::count).sum(),
            Stmt::Switch { cases, .. } => cases
                .iter()
                .flat_map(|c| c.body.iter())
                .map(Stmt::count)
                .sum(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
    /// directionless action parameters are supplied by the control plane
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub direction: Direction,
    pub tpe: P4Type,
}

impl Param {
    pub fn new(name: &str, direction: Direction, tpe: P4Type) -> Self {
        Self {
            name: name.to_string(),
            direction,
            tpe,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<P4Type>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchKind {
    Exact,
    Ternary,
    Lpm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableKey {
    pub name: String,
    pub expr: PExpr,
    pub match_kind: MatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    pub name: String,
    pub args: Vec<PExpr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableImplementation {
    ActionProfile(String),
    ActionSelector(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub keys: Vec<TableKey>,
    pub actions: Vec<String>,
    pub default_action: ActionRef,
    pub implementation: Option<TableImplementation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySet {
    Default,
    Value(BVLiteralInt),
    Mask {
        value: BVLiteralInt,
        mask: BVLiteralInt,
    },
    Range {
        lo: BVLiteralInt,
        hi: BVLiteralInt,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectCase {
    /// one key set per select key
    pub keysets: Vec<KeySet>,
    pub next: String,
}

pub const ACCEPT: &str = "accept";
pub const REJECT: &str = "reject";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Direct(String),
    Select {
        keys: Vec<PExpr>,
        cases: Vec<SelectCase>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserState {
    pub name: String,
    pub body: Vec<Stmt>,
    pub transition: Transition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parser {
    pub name: String,
    pub params: Vec<Param>,
    pub states: Vec<ParserState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}
