// Copyright 2023 The Regents of the University of California
// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use clap::{Parser as _, ValueEnum};
use p4testgen::exec::{ExplorationOptions, Strategy, SymbolicExecutor};
use p4testgen::ir::Context;
use p4testgen::program::*;
use p4testgen::smt::{SmtSolver, SmtSolverOptions, BITWUZLA_CMD, YICES2_CMD, Z3_CMD};
use p4testgen::target::{V1Model, V1ModelConfig};
use std::time::Duration;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SolverChoice {
    Z3,
    Bitwuzla,
    Yices2,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyChoice {
    Dfs,
    Bfs,
    Random,
    Coverage,
}

#[derive(clap::Parser, Debug)]
#[command(name = "testgen")]
#[command(version)]
#[command(about = "Generates packet tests for a small V1Switch forwarding program.", long_about = None)]
struct Args {
    #[arg(long, value_enum, default_value = "z3")]
    solver: SolverChoice,
    #[arg(long, value_enum, default_value = "dfs")]
    strategy: StrategyChoice,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    max_tests: Option<usize>,
    /// wall clock budget in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// uninitialized variables may hold any value
    #[arg(long)]
    taint: bool,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Parses ethernet and forwards IPv4 packets through an exact match table.
fn program() -> Program {
    let sm = P4Type::named("standard_metadata_t");
    let headers = P4Type::named("headers_t");
    let meta = P4Type::named("meta_t");
    let parser = Parser {
        name: "parse".to_string(),
        params: vec![
            Param::new("pkt", Direction::None, P4Type::Extern("packet_in".to_string())),
            Param::new("hdr", Direction::Out, headers.clone()),
            Param::new("meta", Direction::InOut, meta.clone()),
            Param::new("sm", Direction::InOut, sm.clone()),
        ],
        states: vec![
            ParserState {
                name: "start".to_string(),
                body: vec![Stmt::call(Some("pkt"), "extract", vec![PExpr::path("hdr.eth")])],
                transition: Transition::Select {
                    keys: vec![PExpr::path("hdr.eth.ether_type")],
                    cases: vec![SelectCase {
                        keysets: vec![KeySet::Value(0x0800)],
                        next: "parse_ipv4".to_string(),
                    }],
                },
            },
            ParserState {
                name: "parse_ipv4".to_string(),
                body: vec![
                    Stmt::call(Some("pkt"), "extract", vec![PExpr::path("hdr.ipv4")]),
                    Stmt::Verify {
                        cond: PExpr::bin(BinOp::Eq, PExpr::path("hdr.ipv4.version"), PExpr::bits(4, 4)),
                        error: "ParserInvalidArgument".to_string(),
                    },
                ],
                transition: Transition::Direct(ACCEPT.to_string()),
            },
        ],
    };
    let ingress = Control {
        name: "ingress".to_string(),
        params: vec![
            Param::new("hdr", Direction::InOut, headers.clone()),
            Param::new("meta", Direction::InOut, meta),
            Param::new("sm", Direction::InOut, sm),
        ],
        body: vec![Stmt::if_else(
            PExpr::IsValid("hdr.ipv4".to_string()),
            Stmt::Block(vec![
                Stmt::Apply("ipv4_lpm".to_string()),
                Stmt::assign(
                    "hdr.ipv4.ttl",
                    PExpr::bin(BinOp::Sub, PExpr::path("hdr.ipv4.ttl"), PExpr::bits(1, 8)),
                ),
            ]),
            Stmt::call(None, "mark_to_drop", vec![PExpr::path("sm")]),
        )],
    };
    let deparser = Control {
        name: "deparse".to_string(),
        params: vec![
            Param::new("pkt", Direction::None, P4Type::Extern("packet_out".to_string())),
            Param::new("hdr", Direction::In, headers),
        ],
        body: vec![Stmt::call(Some("pkt"), "emit", vec![PExpr::path("hdr")])],
    };
    Program {
        types: vec![
            TypeDecl::header("ethernet_t", &[("dst", 48), ("src", 48), ("ether_type", 16)]),
            TypeDecl::header(
                "ipv4_t",
                &[("version", 4), ("ihl", 4), ("tos", 8), ("len", 16), ("id", 16), ("frag", 16), ("ttl", 8), ("proto", 8), ("csum", 16), ("src", 32), ("dst", 32)],
            ),
            TypeDecl::structure(
                "headers_t",
                &[("eth", P4Type::named("ethernet_t")), ("ipv4", P4Type::named("ipv4_t"))],
            ),
            TypeDecl::structure("meta_t", &[]),
            V1Model::standard_metadata_type(),
        ],
        actions: vec![
            Action {
                name: "forward".to_string(),
                params: vec![Param::new("port", Direction::None, P4Type::Bits(9))],
                body: vec![Stmt::assign("sm.egress_spec", PExpr::path("port"))],
            },
            Action {
                name: "drop".to_string(),
                params: vec![],
                body: vec![Stmt::call(None, "mark_to_drop", vec![PExpr::path("sm")])],
            },
        ],
        tables: vec![Table {
            name: "ipv4_lpm".to_string(),
            keys: vec![TableKey {
                name: "hdr.ipv4.dst".to_string(),
                expr: PExpr::path("hdr.ipv4.dst"),
                match_kind: MatchKind::Lpm,
            }],
            actions: vec!["forward".to_string(), "drop".to_string()],
            default_action: ActionRef {
                name: "drop".to_string(),
                args: vec![],
            },
            implementation: None,
        }],
        parsers: vec![parser],
        controls: vec![ingress, deparser],
        package: vec!["parse".to_string(), "ingress".to_string(), "deparse".to_string()],
        ..Default::default()
    }
}

fn main() {
    let args = Args::parse();
    let level = match args.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )
    .expect("failed to initialize the logger");

    let cmd = match args.solver {
        SolverChoice::Z3 => Z3_CMD,
        SolverChoice::Bitwuzla => BITWUZLA_CMD,
        SolverChoice::Yices2 => YICES2_CMD,
    };
    let solver = SmtSolver::new(cmd, &SmtSolverOptions::default()).expect("failed to start the SMT solver");
    let strategy = match args.strategy {
        StrategyChoice::Dfs => Strategy::DepthFirst,
        StrategyChoice::Bfs => Strategy::BreadthFirst,
        StrategyChoice::Random => Strategy::RandomBacktrack,
        StrategyChoice::Coverage => Strategy::CoverageGuided,
    };
    let opts = ExplorationOptions {
        strategy,
        seed: args.seed,
        max_tests: args.max_tests,
        time_budget: args.timeout.map(Duration::from_secs),
        ..Default::default()
    };
    let target = V1Model::new(V1ModelConfig {
        taint_uninitialized: args.taint,
        ..Default::default()
    });

    let program = program();
    let mut ctx = Context::default();
    let mut executor = SymbolicExecutor::new(&program, &target, solver, opts);
    let mut count = 0;
    let stats = executor
        .run(&mut ctx, |test| {
            count += 1;
            println!("=== test {count} ===\n{test}\n");
            true
        })
        .expect("exploration failed");
    println!(
        "{} tests, {:.1}% statement coverage",
        stats.tests,
        stats.coverage() * 100.0
    );
}
