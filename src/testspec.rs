// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! The artifact that is handed to test writers once a path has been solved.

use crate::exec::Termination;
use crate::ir::{Context, ExprRef};
use crate::smt::Model;
use baa::{BitVecOps, BitVecValue};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq)]
pub struct TableMatch<V> {
    pub key: String,
    pub kind: crate::program::MatchKind,
    pub value: V,
    /// ternary and lpm matches only
    pub mask: Option<V>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionCall<V> {
    pub action: String,
    pub args: Vec<(String, V)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRule<V> {
    pub matches: Vec<TableMatch<V>>,
    pub action: ActionCall<V>,
}

/// Configuration fragments that the control plane needs to install for a test.
/// Values are symbolic (`V = ExprRef`) during exploration and concrete afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum TestObject<V> {
    TableConfig {
        table: String,
        rules: Vec<TableRule<V>>,
    },
    ActionProfile {
        profile: String,
        actions: Vec<ActionCall<V>>,
    },
    ActionSelector {
        selector: String,
        actions: Vec<ActionCall<V>>,
    },
    CloneInfo {
        session: V,
        clone_type: V,
    },
}

impl<V> ActionCall<V> {
    fn map<W>(&self, f: &mut impl FnMut(&V) -> W) -> ActionCall<W> {
        ActionCall {
            action: self.action.clone(),
            args: self.args.iter().map(|(n, v)| (n.clone(), f(v))).collect(),
        }
    }
}

impl<V> TestObject<V> {
    pub fn map<W>(&self, mut f: impl FnMut(&V) -> W) -> TestObject<W> {
        match self {
            TestObject::TableConfig { table, rules } => TestObject::TableConfig {
                table: table.clone(),
                rules: rules
                    .iter()
                    .map(|r| TableRule {
                        matches: r
                            .matches
                            .iter()
                            .map(|m| TableMatch {
                                key: m.key.clone(),
                                kind: m.kind,
                                value: f(&m.value),
                                mask: m.mask.as_ref().map(&mut f),
                            })
                            .collect(),
                        action: r.action.map(&mut f),
                    })
                    .collect(),
            },
            TestObject::ActionProfile { profile, actions } => TestObject::ActionProfile {
                profile: profile.clone(),
                actions: actions.iter().map(|a| a.map(&mut f)).collect(),
            },
            TestObject::ActionSelector { selector, actions } => TestObject::ActionSelector {
                selector: selector.clone(),
                actions: actions.iter().map(|a| a.map(&mut f)).collect(),
            },
            TestObject::CloneInfo {
                session,
                clone_type,
            } => TestObject::CloneInfo {
                session: f(session),
                clone_type: f(clone_type),
            },
        }
    }

    /// Visits every value in a deterministic order.
    pub fn for_each_value(&self, mut f: impl FnMut(&V)) {
        self.map(|v| f(v));
    }
}

impl TestObject<ExprRef> {
    /// Replaces every placeholder with its value under `model`.
    pub fn resolve(&self, ctx: &Context, model: &Model) -> TestObject<BitVecValue> {
        self.map(|e| model.evaluate(ctx, *e))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestPacket {
    pub port: BitVecValue,
    /// `None` for a packet without any bits
    pub payload: Option<BitVecValue>,
    /// bits that are set can take any value
    pub taint_mask: Option<BitVecValue>,
}

impl Display for TestPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "port {}", self.port.to_u64().unwrap_or_default())?;
        if let Some(payload) = &self.payload {
            write!(f, " payload {} ({} bits)", to_hex(payload), payload.width())?;
        }
        if let Some(mask) = self.taint_mask.as_ref().filter(|m| !m.is_zero()) {
            write!(f, " don't care {}", to_hex(mask))?;
        }
        Ok(())
    }
}

/// Most significant nibble first.
pub fn to_hex(value: &BitVecValue) -> String {
    let width = value.width();
    let nibbles = width.div_ceil(4);
    (0..nibbles)
        .rev()
        .map(|ii| {
            let lo = ii * 4;
            let hi = (lo + 3).min(width - 1);
            let digit = value.slice(hi, lo).to_u64().unwrap_or_default();
            char::from_digit(digit as u32, 16).unwrap_or('?')
        })
        .collect()
}

pub type TestObjects = BTreeMap<String, BTreeMap<String, TestObject<BitVecValue>>>;

/// A concrete test: send `ingress` and expect `egress`, or expect a drop if `egress` is
/// `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSpec {
    pub ingress: TestPacket,
    pub egress: Option<TestPacket>,
    pub traces: Vec<String>,
    pub objects: TestObjects,
    pub termination: Termination,
}

impl TestSpec {
    pub fn is_drop(&self) -> bool {
        self.egress.is_none()
    }
}

impl Display for TestSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "input: {}", self.ingress)?;
        match &self.egress {
            Some(egress) => writeln!(f, "output: {egress}")?,
            None => writeln!(f, "output: drop")?,
        }
        for (category, objects) in self.objects.iter() {
            for name in objects.keys() {
                writeln!(f, "{category}: {name}")?;
            }
        }
        for trace in self.traces.iter() {
            writeln!(f, "  {trace}")?;
        }
        write!(f, "terminated: {}", self.termination)
    }
}
