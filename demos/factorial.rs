use std::time::Duration;

use clap::{Parser, ValueEnum};
use color_eyre::Result;
use concolic_bdd::executor::Target;
use concolic_bdd::probe::Site;
use concolic_bdd::search::{Search, SearchConfig};
use concolic_bdd::selector::Policy;
use concolic_bdd::smtlib::{ProcessSolver, ProcessSolverConfig};
use concolic_bdd::solver::{BddSolver, Solver, SolverConfig};
use concolic_bdd::state::Input;
use concolic_bdd::value::SymbolicValue;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Novelty {
    /// A branch side is new while its successor line never ran
    Line,
    /// A branch side is new while its arc was never traversed
    Arc,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    /// Built-in bit-blasting BDD solver
    Bdd,
    /// External `z3` process
    Z3,
}

#[derive(Parser)]
#[command(name = "factorial")]
#[command(about = "Concolic exploration of an iterative factorial", long_about = None)]
struct Cli {
    /// Seed value of `n`
    #[arg(short, long, default_value_t = 5, allow_hyphen_values = true)]
    seed: i64,
    /// Maximum number of runs
    #[arg(short, long, default_value_t = 20)]
    iterations: usize,
    /// Per-solve timeout in milliseconds
    #[arg(short, long, default_value_t = 5000)]
    timeout: u64,
    #[arg(long, value_enum, default_value = "arc")]
    policy: Novelty,
    #[arg(long, value_enum, default_value = "bdd")]
    solver: Backend,
    /// Number of generated inputs run in parallel
    #[arg(long, default_value_t = 1)]
    batch: usize,
    /// Count the models of every solved divergence
    #[arg(long)]
    count: bool,
    /// More logging (`-v` for debug, `-vv` for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn factorial() -> Target {
    Target::new("factorial", |p| {
        let mut n = p.input("n")?;
        if p.branch(Site::new(2, 3, 4), &n.lt(0))? {
            p.stmt(3)?;
            return Ok(None);
        }
        if p.branch(Site::new(4, 5, 6), &n.eq(0))? {
            p.stmt(5)?;
            return Ok(Some(1.into()));
        }
        if p.branch(Site::new(6, 7, 8), &n.eq(1))? {
            p.stmt(7)?;
            return Ok(Some(1.into()));
        }
        p.stmt(8)?;
        let mut result = SymbolicValue::from(1);
        while p.branch(Site::new(9, 10, 12), &n.ne(0))? {
            p.stmt(10)?;
            result = &result * &n;
            p.stmt(11)?;
            n = &n - 1;
        }
        p.stmt(12)?;
        Ok(Some(result))
    })
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let solver: Box<dyn Solver> = match cli.solver {
        Backend::Bdd => Box::new(BddSolver::new(SolverConfig {
            count_models: cli.count,
            ..SolverConfig::default()
        })),
        Backend::Z3 => Box::new(ProcessSolver::new(ProcessSolverConfig::default())),
    };
    let config = SearchConfig {
        iterations: cli.iterations,
        solve_timeout: Duration::from_millis(cli.timeout),
        policy: match cli.policy {
            Novelty::Line => Policy::Line,
            Novelty::Arc => Policy::Arc,
        },
        batch_size: cli.batch,
        ..SearchConfig::default()
    };

    let target = factorial();
    let report = Search::new(config, solver).run(&target, Input::new().with("n", cli.seed));

    println!("{}", report);
    for (i, run) in report.runs.iter().enumerate() {
        println!("run {:>2}: {} -> {:?} (+{} lines, +{} arcs)", i, run.input, run.outcome, run.new_lines, run.new_arcs);
    }
    for line in report.coverage.sorted_lines() {
        println!("covered {}", line);
    }
    for outcome in &report.unreachable {
        println!("unreachable {}", outcome);
    }
    for (outcome, reason) in &report.unresolved {
        println!("unresolved {} ({})", outcome, reason);
    }

    Ok(())
}
