//! The factorial walkthrough: one seed, every branch outcome.

mod common;

use std::time::Duration;

use concolic_bdd::coverage::Coverage;
use concolic_bdd::executor::{ConcolicExecutor, RunOutcome};
use concolic_bdd::location::Arc;
use concolic_bdd::path::BranchOutcome;
use concolic_bdd::search::{search, Search, SearchConfig, StopReason};
use concolic_bdd::selector::{DivergenceSelector, Ledger, Policy};
use concolic_bdd::state::Input;
use concolic_bdd::value::Value;
use test_log::test;

use common::factorial;

#[test]
fn seed_run_path_condition() {
    let target = factorial();
    let run = ConcolicExecutor::default().run(&target, &Input::new().with("n", 5));

    assert_eq!(run.outcome, RunOutcome::Returned(Some(Value::Int(120))));
    let decisions: Vec<(u32, bool)> = run.path.iter().map(|c| (c.site.at.line, c.taken)).collect();
    let mut expected = vec![(2, false), (4, false), (6, false)];
    expected.extend([(9, true); 5]);
    expected.push((9, false));
    assert_eq!(decisions, expected);
    assert_eq!(run.path.holds_for(&run.input), Ok(true));
}

#[test]
fn first_divergence_negates_the_sign_test() {
    let target = factorial();
    let f = target.function().clone();
    let run = ConcolicExecutor::default().run(&target, &Input::new().with("n", 5));
    let mut coverage = Coverage::new();
    coverage.accumulate(&run.trace);

    let divergence = DivergenceSelector::default()
        .select(&run.path, &coverage, &Ledger::default())
        .unwrap();
    assert_eq!(divergence.index, 0);
    assert_eq!(divergence.target, BranchOutcome { at: f.at(2), outcome: true });
    assert_eq!(divergence.formula.to_string(), "(n < 0)");
}

#[test]
fn search_covers_every_outcome() {
    let target = factorial();
    let f = target.function().clone();
    let report = search(&target, Input::new().with("n", 5), 20, Duration::from_secs(5));

    assert_eq!(report.stop, StopReason::Exhausted);
    assert_eq!(
        report.generated_inputs,
        vec![Input::new().with("n", -1), Input::new().with("n", 0), Input::new().with("n", 1)]
    );
    // One run per distinct branch point.
    assert_eq!(report.runs.len(), 4);
    assert!(report.unreachable.is_empty());
    assert!(report.unresolved.is_empty());
    assert!(report.faults.is_empty());

    for line in [2, 4, 6, 9] {
        for outcome in [true, false] {
            assert!(report.outcomes.contains(&BranchOutcome { at: f.at(line), outcome }), "{}:{}", line, outcome);
        }
    }
    for (from, to) in [(2, 3), (2, 4), (4, 5), (4, 6), (6, 7), (6, 8), (9, 10), (9, 12)] {
        assert!(report.coverage.has_arc(&Arc::new(f.at(from), f.at(to))), "{} -> {}", from, to);
    }
    assert_eq!(report.coverage.num_lines(), 11);

    let returned: Vec<RunOutcome> = report.runs.iter().map(|r| r.outcome.clone()).collect();
    assert_eq!(
        returned,
        vec![
            RunOutcome::Returned(Some(Value::Int(120))),
            RunOutcome::Returned(None),
            RunOutcome::Returned(Some(Value::Int(1))),
            RunOutcome::Returned(Some(Value::Int(1))),
        ]
    );
}

#[test]
fn line_policy_reaches_the_same_outcomes() {
    let target = factorial();
    let config = SearchConfig {
        policy: Policy::Line,
        ..SearchConfig::default()
    };
    let report = Search::with_default_solver(config).run(&target, Input::new().with("n", 5));
    assert_eq!(report.stop, StopReason::Exhausted);
    assert_eq!(report.outcomes.len(), 8);
    assert_eq!(report.runs.len(), 4);
}

#[test]
fn batched_search_matches_serial_search() {
    let target = factorial();
    let serial = search(&target, Input::new().with("n", 5), 20, Duration::from_secs(5));
    let config = SearchConfig {
        batch_size: 4,
        ..SearchConfig::default()
    };
    let batched = Search::with_default_solver(config).run(&target, Input::new().with("n", 5));

    assert_eq!(batched.stop, StopReason::Exhausted);
    assert_eq!(batched.coverage, serial.coverage);
    assert_eq!(batched.outcomes, serial.outcomes);
    assert_eq!(batched.generated_inputs, serial.generated_inputs);
}
