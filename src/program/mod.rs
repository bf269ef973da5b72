// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! The read-only program tree. It is produced by a front end that already resolved names
//! and checked types; the engine never modifies it.
//!
//! Names of variables, actions, tables and functions are expected to be unique across the
//! whole program.

mod ast;

pub use ast::*;

use crate::ir::{vars, BVLiteralInt, WidthInt};
use fuzzy_matcher::FuzzyMatcher;

/// Errors that every program knows about, in the order of their numeric codes.
pub const STANDARD_ERRORS: [&str; 7] = [
    "NoError",
    "PacketTooShort",
    "NoMatch",
    "StackOutOfBounds",
    "HeaderTooShort",
    "ParserTimeout",
    "ParserInvalidArgument",
];

#[derive(Debug, Clone, Copy)]
pub enum Block<'p> {
    Parser(&'p Parser),
    Control(&'p Control),
}

impl<'p> Block<'p> {
    pub fn name(&self) -> &'p str {
        match self {
            Block::Parser(p) => &p.name,
            Block::Control(c) => &c.name,
        }
    }

    pub fn params(&self) -> &'p [Param] {
        match self {
            Block::Parser(p) => &p.params,
            Block::Control(c) => &c.params,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub types: Vec<TypeDecl>,
    /// user defined errors, numbered after [`STANDARD_ERRORS`]
    pub errors: Vec<String>,
    pub actions: Vec<Action>,
    pub tables: Vec<Table>,
    pub functions: Vec<Function>,
    pub parsers: Vec<Parser>,
    pub controls: Vec<Control>,
    /// names of the parsers and controls that make up the pipeline, in order
    pub package: Vec<String>,
}

pub(crate) fn suggest<'a>(kind: &str, name: &str, candidates: impl Iterator<Item = &'a str>) -> ! {
    let matcher = fuzzy_matcher::skim::SkimMatcherV2::default();
    let mut matches: Vec<(&str, i64)> = candidates
        .flat_map(|other| matcher.fuzzy_match(other, name).map(|s| (other, s)))
        .collect();
    matches.sort_by_key(|(_, s)| -(*s));
    let suggestions = matches
        .iter()
        .take(5)
        .map(|(n, _)| *n)
        .collect::<Vec<&str>>()
        .join(", ");
    if suggestions.is_empty() {
        panic!("Unknown {kind} `{name}`.");
    } else {
        panic!("Unknown {kind} `{name}`. Did you mean: {suggestions}?");
    }
}

impl Program {
    pub fn try_find_type(&self, name: &str) -> Option<&TypeDecl> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn find_type(&self, name: &str) -> &TypeDecl {
        self.try_find_type(name)
            .unwrap_or_else(|| suggest("type", name, self.types.iter().map(|t| t.name.as_str())))
    }

    pub fn try_find_action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn find_action(&self, name: &str) -> &Action {
        self.try_find_action(name).unwrap_or_else(|| {
            suggest("action", name, self.actions.iter().map(|a| a.name.as_str()))
        })
    }

    pub fn find_table(&self, name: &str) -> &Table {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .unwrap_or_else(|| suggest("table", name, self.tables.iter().map(|t| t.name.as_str())))
    }

    pub fn try_find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn find_block(&self, name: &str) -> Block<'_> {
        if let Some(p) = self.parsers.iter().find(|p| p.name == name) {
            Block::Parser(p)
        } else if let Some(c) = self.controls.iter().find(|c| c.name == name) {
            Block::Control(c)
        } else {
            let all = self
                .parsers
                .iter()
                .map(|p| p.name.as_str())
                .chain(self.controls.iter().map(|c| c.name.as_str()));
            suggest("parser or control", name, all)
        }
    }

    /// The pipeline blocks in execution order.
    pub fn pipeline(&self) -> Vec<Block<'_>> {
        self.package.iter().map(|n| self.find_block(n)).collect()
    }

    pub fn error_code(&self, name: &str) -> BVLiteralInt {
        STANDARD_ERRORS
            .iter()
            .copied()
            .chain(self.errors.iter().map(|e| e.as_str()))
            .position(|e| e == name)
            .unwrap_or_else(|| {
                let all = STANDARD_ERRORS
                    .iter()
                    .copied()
                    .chain(self.errors.iter().map(|e| e.as_str()));
                suggest("error", name, all)
            }) as BVLiteralInt
    }

    /// Expands `path` of type `tpe` into its scalar leaves, including header validity flags.
    pub fn leaves(&self, path: &str, tpe: &P4Type) -> Vec<(String, WidthInt)> {
        let mut out = vec![];
        self.collect_leaves(path, tpe, &mut out);
        out
    }

    fn collect_leaves(&self, path: &str, tpe: &P4Type, out: &mut Vec<(String, WidthInt)>) {
        match tpe {
            P4Type::Named(name) => {
                let decl = self.find_type(name);
                for field in decl.fields.iter() {
                    self.collect_leaves(&format!("{path}.{}", field.name), &field.tpe, out);
                }
                if decl.kind == TypeKind::Header {
                    out.push((vars::validity_name(path), 1));
                }
            }
            P4Type::Extern(_) => {}
            scalar => {
                let width = scalar.scalar_width().unwrap_or_else(|| unreachable!());
                out.push((path.to_string(), width));
            }
        }
    }

    /// The data fields of a header instance, most significant (first on the wire) first.
    pub fn header_fields(&self, path: &str, type_name: &str) -> Vec<(String, WidthInt)> {
        let decl = self.find_type(type_name);
        assert_eq!(decl.kind, TypeKind::Header, "{type_name} is not a header");
        decl.fields
            .iter()
            .map(|f| {
                let width = f
                    .tpe
                    .scalar_width()
                    .unwrap_or_else(|| panic!("header field {path}.{} is not a scalar", f.name));
                (format!("{path}.{}", f.name), width)
            })
            .collect()
    }

    pub fn num_statements(&self) -> usize {
        let count = |stmts: &[Stmt]| stmts.iter().map(Stmt::count).sum::<usize>();
        self.actions.iter().map(|a| count(&a.body)).sum::<usize>()
            + self.functions.iter().map(|f| count(&f.body)).sum::<usize>()
            + self.controls.iter().map(|c| count(&c.body)).sum::<usize>()
            + self
                .parsers
                .iter()
                .flat_map(|p| p.states.iter())
                .map(|s| count(&s.body))
                .sum::<usize>()
    }
}
