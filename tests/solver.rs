// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// These tests need an external SMT solver and are skipped if z3 is not installed.

use baa::BitVecOps;
use p4testgen::exec::*;
use p4testgen::ir::*;
use p4testgen::program::*;
use p4testgen::smt::*;
use p4testgen::target::{V1Model, V1ModelConfig};
use p4testgen::testspec::{TestObject, TestSpec};

fn z3() -> Option<SmtSolver> {
    if !Z3_CMD.is_available() {
        log::warn!("z3 is not installed, skipping");
        return None;
    }
    Some(SmtSolver::new(Z3_CMD, &SmtSolverOptions::default()).unwrap())
}

#[test_log::test]
fn incremental_checks() {
    let Some(mut solver) = z3() else { return };
    let mut ctx = Context::default();
    let a = ctx.bv_symbol("a", 4);
    let b = ctx.bv_symbol("b", 4);
    let fifteen = ctx.bv_lit(15, 4);
    let sum = ctx.add(a, fifteen);
    let cond = ctx.less(sum, b);

    solver.assert(&ctx, cond).unwrap();
    solver.assert(&ctx, cond).unwrap();
    assert_eq!(solver.check_sat(&ctx, &[]).unwrap(), SatResult::Sat);
    let model = solver.get_model(&ctx).unwrap();
    assert_eq!(model.len(), 2);
    assert!(model.evaluate(&ctx, cond).is_tru());

    // b can never be smaller than zero
    let zero = ctx.zero(4);
    let b_is_zero = ctx.bv_equal(b, zero);
    solver.push().unwrap();
    solver.assert(&ctx, b_is_zero).unwrap();
    assert_eq!(solver.check_sat(&ctx, &[]).unwrap(), SatResult::Unsat);
    solver.pop().unwrap();
    assert_eq!(solver.check_sat(&ctx, &[]).unwrap(), SatResult::Sat);

    // assumptions only hold for one check
    let not_cond = ctx.not(cond);
    assert_eq!(solver.check_sat(&ctx, &[not_cond]).unwrap(), SatResult::Unsat);
    assert_eq!(solver.check_sat(&ctx, &[]).unwrap(), SatResult::Sat);
}

#[test_log::test]
fn taint_leaves_are_unconstrained() {
    let Some(mut solver) = z3() else { return };
    let mut ctx = Context::default();
    let t = ctx.taint(16);
    let x = ctx.bv_symbol("x", 16);
    let sum = ctx.add(x, t);
    let target_value = ctx.bv_lit(0xbeef, 16);
    let eq = ctx.bv_equal(sum, target_value);
    let x_value = ctx.bv_lit(1, 16);
    let x_is_one = ctx.bv_equal(x, x_value);
    assert_eq!(solver.check_sat(&ctx, &[eq, x_is_one]).unwrap(), SatResult::Sat);
    let model = solver.get_model(&ctx).unwrap();
    assert_eq!(model.len(), 1);
    assert_eq!(model.get(t).and_then(|v| v.to_u64()), Some(0xbeee));
}

fn forwarding_program() -> Program {
    let sm = P4Type::named("standard_metadata_t");
    let headers = P4Type::named("headers_t");
    let parser = Parser {
        name: "p".to_string(),
        params: vec![
            Param::new("pkt", Direction::None, P4Type::Extern("packet_in".to_string())),
            Param::new("hdr", Direction::Out, headers.clone()),
            Param::new("meta", Direction::InOut, P4Type::named("meta_t")),
            Param::new("sm", Direction::InOut, sm.clone()),
        ],
        states: vec![ParserState {
            name: "start".to_string(),
            body: vec![Stmt::call(
                Some("pkt"),
                "extract",
                vec![PExpr::path("hdr.eth")],
            )],
            transition: Transition::Select {
                keys: vec![PExpr::path("hdr.eth.ether_type")],
                cases: vec![
                    SelectCase {
                        keysets: vec![KeySet::Value(0x0800)],
                        next: ACCEPT.to_string(),
                    },
                    SelectCase {
                        keysets: vec![KeySet::Default],
                        next: REJECT.to_string(),
                    },
                ],
            },
        }],
    };
    let ingress = Control {
        name: "ingress".to_string(),
        params: vec![
            Param::new("hdr", Direction::InOut, headers.clone()),
            Param::new("meta", Direction::InOut, P4Type::named("meta_t")),
            Param::new("sm", Direction::InOut, sm),
        ],
        body: vec![Stmt::Apply("fwd".to_string())],
    };
    let deparser = Control {
        name: "deparser".to_string(),
        params: vec![
            Param::new("pkt", Direction::None, P4Type::Extern("packet_out".to_string())),
            Param::new("hdr", Direction::In, headers),
        ],
        body: vec![Stmt::call(Some("pkt"), "emit", vec![PExpr::path("hdr")])],
    };
    Program {
        types: vec![
            TypeDecl::header("ethernet_t", &[("dst", 48), ("src", 48), ("ether_type", 16)]),
            TypeDecl::structure("headers_t", &[("eth", P4Type::named("ethernet_t"))]),
            TypeDecl::structure("meta_t", &[("m", P4Type::Bits(8))]),
            V1Model::standard_metadata_type(),
        ],
        actions: vec![
            Action {
                name: "set_port".to_string(),
                params: vec![Param::new("port", Direction::None, P4Type::Bits(9))],
                body: vec![Stmt::assign("sm.egress_spec", PExpr::path("port"))],
            },
            Action {
                name: "drop_it".to_string(),
                params: vec![],
                body: vec![Stmt::call(None, "mark_to_drop", vec![PExpr::path("sm")])],
            },
        ],
        tables: vec![Table {
            name: "fwd".to_string(),
            keys: vec![TableKey {
                name: "hdr.eth.dst".to_string(),
                expr: PExpr::path("hdr.eth.dst"),
                match_kind: MatchKind::Exact,
            }],
            actions: vec!["set_port".to_string(), "drop_it".to_string()],
            default_action: ActionRef {
                name: "drop_it".to_string(),
                args: vec![],
            },
            implementation: None,
        }],
        parsers: vec![parser],
        controls: vec![ingress, deparser],
        package: vec!["p".to_string(), "ingress".to_string(), "deparser".to_string()],
        ..Default::default()
    }
}

#[test_log::test]
fn v1model_forwarding() {
    let Some(solver) = z3() else { return };
    let program = forwarding_program();
    let target = V1Model::new(V1ModelConfig {
        max_packet_bits: 64 * 8,
        ..Default::default()
    });
    let mut ctx = Context::default();
    let mut executor = SymbolicExecutor::new(&program, &target, solver, ExplorationOptions::default());
    let mut tests: Vec<TestSpec> = vec![];
    let stats = executor
        .run(&mut ctx, |t| {
            tests.push(t.clone());
            true
        })
        .unwrap();
    assert_eq!(stats.tests, tests.len());
    assert_eq!(stats.solver_unknown, 0);

    let payload_width = |t: &TestSpec| t.ingress.payload.as_ref().map_or(0, |p| p.width());

    // too short for an ethernet header
    assert!(tests.iter().any(|t| payload_width(t) < 112));

    let mut forwarded = 0;
    for test in tests.iter() {
        assert_eq!(payload_width(test) % 8, 0);
        let rules = match test.objects.get(TABLE_CONFIGS).and_then(|o| o.get("fwd")) {
            Some(TestObject::TableConfig { rules, .. }) => rules.clone(),
            _ => vec![],
        };
        let rejected = test.traces.iter().any(|e| e.contains("[exception]"));
        match &test.egress {
            None => assert!(test.is_drop()),
            Some(egress) => {
                forwarded += 1;
                // only a hit on set_port forwards the packet
                assert_eq!(rules.len(), 1);
                assert_eq!(rules[0].action.action, "set_port");
                let port = &rules[0].action.args[0].1;
                assert_eq!(egress.port.to_u64(), port.to_u64());
                assert_ne!(egress.port.to_u64(), Some(511));
            }
        }
        if !rejected {
            let payload = test.ingress.payload.as_ref().unwrap();
            let w = payload.width();
            assert_eq!(payload.slice(w - 97, w - 112).to_u64(), Some(0x0800));
            let egress = test.egress.as_ref().unwrap();
            assert_eq!(egress.payload.as_ref().unwrap().width(), w);
            // the table matched the destination address of the packet
            assert_eq!(payload.slice(w - 1, w - 48).to_u64(), rules[0].matches[0].value.to_u64());
        }
    }
    assert!(forwarded > 0);
    assert!(tests.iter().any(|t| t.termination == Termination::Exception(ExceptionKind::Drop)));
}
