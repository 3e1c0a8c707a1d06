//! The search loop.
//!
//! Each iteration runs one queued input, folds its trace into the session
//! coverage, and, once the queue is empty, asks the selector for divergences
//! until the gateway produces a new input. Paths of earlier runs are kept on a
//! frontier, newest first, so divergences left behind by older runs are
//! revisited when newer runs have nothing left to flip.
//!
//! An undecided branch outcome is retried only after another run has been
//! absorbed, and solver calls are charged against the iteration budget, so a
//! search performs at most `iterations` runs and `iterations` solver calls.
//!
//! Coverage has a single writer: runs of a batch may execute in parallel, but
//! their results are accumulated one at a time in queue order.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::coverage::Coverage;
use crate::error::Fault;
use crate::executor::{ConcolicExecutor, Run, RunOutcome, Target};
use crate::gateway::{Resolution, SolverGateway};
use crate::path::{BranchOutcome, PathCondition};
use crate::probe::ExecutionBudget;
use crate::selector::{DivergenceSelector, Ledger, Policy};
use crate::solver::{BddSolver, Solver};
use crate::state::Input;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Maximum number of target runs, seeds included, and of solver calls.
    pub iterations: usize,
    /// Wall-clock budget of the whole search.
    pub time_budget: Option<Duration>,
    /// Budget of a single solver call.
    pub solve_timeout: Duration,
    /// Budget of a single target run.
    pub execution: ExecutionBudget,
    pub policy: Policy,
    /// Undecided attempts before a branch outcome is given up.
    pub max_unknown_retries: u32,
    /// Number of queued inputs run in parallel.
    pub batch_size: usize,
    /// Seeds run after the main one.
    pub seeds: Vec<Input>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            time_budget: None,
            solve_timeout: Duration::from_secs(5),
            execution: ExecutionBudget::default(),
            policy: Policy::default(),
            max_unknown_retries: 3,
            batch_size: 1,
            seeds: Vec::new(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// No divergence left and no input queued.
    Exhausted,
    IterationBudget,
    TimeBudget,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Exhausted => write!(f, "exhausted"),
            StopReason::IterationBudget => write!(f, "iteration budget"),
            StopReason::TimeBudget => write!(f, "time budget"),
        }
    }
}

/// One executed input, as reported.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub input: Input,
    pub outcome: RunOutcome,
    pub branches: usize,
    pub new_lines: usize,
    pub new_arcs: usize,
}

#[derive(Debug, Clone)]
pub struct SearchReport {
    pub coverage: Coverage,
    /// Solver-produced inputs, in the order they were generated.
    pub generated_inputs: Vec<Input>,
    /// Branch outcomes given up after repeated undecided attempts.
    pub unresolved: BTreeMap<BranchOutcome, String>,
    /// Branch outcomes proven infeasible on the path leading to them.
    pub unreachable: BTreeSet<BranchOutcome>,
    /// Branch outcomes taken by at least one run.
    pub outcomes: BTreeSet<BranchOutcome>,
    pub runs: Vec<RunSummary>,
    pub faults: Vec<(Input, Fault)>,
    pub solver_calls: usize,
    pub stop: StopReason,
    pub elapsed: Duration,
}

impl fmt::Display for SearchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} runs, {} generated inputs, {}, {} outcomes, {} unreachable, {} unresolved, {} faults ({}, {:.2?})",
            self.runs.len(),
            self.generated_inputs.len(),
            self.coverage,
            self.outcomes.len(),
            self.unreachable.len(),
            self.unresolved.len(),
            self.faults.len(),
            self.stop,
            self.elapsed,
        )
    }
}

#[derive(Debug)]
struct Queued {
    input: Input,
    /// Branch outcome the input was generated for.
    aim: Option<BranchOutcome>,
}

/// A finished run whose path may still hold divergences.
#[derive(Debug)]
struct Explored {
    input: Input,
    path: PathCondition,
}

enum Refill {
    Queued,
    Exhausted,
    OutOfCalls,
    OutOfTime,
}

/// Mutable state of one search session.
struct Session {
    started: Instant,
    coverage: Coverage,
    ledger: Ledger,
    queue: VecDeque<Queued>,
    frontier: Vec<Explored>,
    executed: HashSet<Input>,
    generated: Vec<Input>,
    outcomes: BTreeSet<BranchOutcome>,
    runs: Vec<RunSummary>,
    faults: Vec<(Input, Fault)>,
    solver_calls: usize,
}

pub struct Search<S> {
    config: SearchConfig,
    executor: ConcolicExecutor,
    selector: DivergenceSelector,
    gateway: SolverGateway<S>,
}

impl Search<BddSolver> {
    pub fn with_default_solver(config: SearchConfig) -> Self {
        Self::new(config, BddSolver::default())
    }
}

impl<S: Solver> Search<S> {
    pub fn new(config: SearchConfig, solver: S) -> Self {
        Self {
            executor: ConcolicExecutor::new(config.execution),
            selector: DivergenceSelector::new(config.policy),
            gateway: SolverGateway::new(solver),
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    fn out_of_time(&self, session: &Session) -> bool {
        self.config.time_budget.is_some_and(|budget| session.started.elapsed() >= budget)
    }

    /// Per-call solver timeout, clipped to what is left of the time budget.
    fn solve_timeout(&self, session: &Session) -> Duration {
        match self.config.time_budget {
            Some(budget) => self.config.solve_timeout.min(budget.saturating_sub(session.started.elapsed())),
            None => self.config.solve_timeout,
        }
    }

    /// Explores `target` starting from `seed`.
    pub fn run(&self, target: &Target, seed: Input) -> SearchReport {
        let mut session = Session {
            started: Instant::now(),
            coverage: Coverage::new(),
            ledger: Ledger::new(self.config.max_unknown_retries),
            queue: VecDeque::new(),
            frontier: Vec::new(),
            executed: HashSet::new(),
            generated: Vec::new(),
            outcomes: BTreeSet::new(),
            runs: Vec::new(),
            faults: Vec::new(),
            solver_calls: 0,
        };
        for input in std::iter::once(seed).chain(self.config.seeds.iter().cloned()) {
            session.queue.push_back(Queued { input, aim: None });
        }
        info!("search {} with {} seed(s)", target.function(), session.queue.len());

        let stop = loop {
            if session.runs.len() >= self.config.iterations {
                break StopReason::IterationBudget;
            }
            if self.out_of_time(&session) {
                break StopReason::TimeBudget;
            }
            if session.queue.is_empty() {
                match self.refill(&mut session) {
                    Refill::Queued => {}
                    Refill::Exhausted => break StopReason::Exhausted,
                    Refill::OutOfCalls => break StopReason::IterationBudget,
                    Refill::OutOfTime => break StopReason::TimeBudget,
                }
            }

            let remaining = self.config.iterations - session.runs.len();
            let take = self.config.batch_size.max(1).min(remaining).min(session.queue.len());
            let batch: Vec<Queued> = session.queue.drain(..take).collect();
            let runs: Vec<Run> = if batch.len() > 1 {
                batch.par_iter().map(|q| self.executor.run(target, &q.input)).collect()
            } else {
                batch.iter().map(|q| self.executor.run(target, &q.input)).collect()
            };
            for (queued, run) in batch.into_iter().zip(runs) {
                self.absorb(&mut session, queued, run);
            }
        };

        // Inputs still queued never ran.
        for queued in session.queue.drain(..) {
            if let Some(aim) = queued.aim {
                session.ledger.settle(&aim);
            }
        }
        session.ledger.give_up();

        let report = SearchReport {
            coverage: session.coverage,
            generated_inputs: session.generated,
            unresolved: session.ledger.unresolved().clone(),
            unreachable: session.ledger.unreachable().clone(),
            outcomes: session.outcomes,
            runs: session.runs,
            faults: session.faults,
            solver_calls: session.solver_calls,
            stop,
            elapsed: session.started.elapsed(),
        };
        info!("search {} finished: {}", target.function(), report);
        report
    }

    /// Accumulates one finished run.
    fn absorb(&self, session: &mut Session, queued: Queued, run: Run) {
        let delta = session.coverage.accumulate(&run.trace);
        session.ledger.reopen();
        session.executed.insert(run.input.clone());
        session.outcomes.extend(run.path.iter().map(|c| c.outcome()));

        match run.path.holds_for(&run.input) {
            Ok(true) => {}
            Ok(false) => warn!("path condition of {} does not hold for its own input", run.input),
            Err(e) => warn!("path condition of {} cannot be evaluated: {}", run.input, e),
        }

        if let Some(aim) = queued.aim {
            session.ledger.settle(&aim);
            if !run.took(&aim.at, aim.outcome) {
                warn!("input {} did not reach {}", run.input, aim);
                session.ledger.record_unknown(aim, "generated input did not take the branch");
            }
        }

        info!(
            "run #{} {}: +{} lines, +{} arcs, {} branches",
            session.runs.len(),
            run.input,
            delta.new_lines.len(),
            delta.new_arcs.len(),
            run.path.len()
        );
        if let RunOutcome::Faulted(fault) = &run.outcome {
            info!("run #{} faulted: {}", session.runs.len(), fault);
            session.faults.push((run.input.clone(), fault.clone()));
        }

        session.runs.push(RunSummary {
            input: run.input.clone(),
            outcome: run.outcome,
            branches: run.path.len(),
            new_lines: delta.new_lines.len(),
            new_arcs: delta.new_arcs.len(),
        });
        if !run.path.is_empty() {
            session.frontier.push(Explored {
                input: run.input,
                path: run.path,
            });
        }
    }

    /// Solves divergences until enough inputs are queued.
    ///
    /// Fresh candidates of every explored path are tried before any candidate
    /// that already came back undecided. Once a flip of some path is queued,
    /// deeper candidates of the same path wait for the next refill: their
    /// prefixes may not hold for the queued input.
    fn refill(&self, session: &mut Session) -> Refill {
        let batch_size = self.config.batch_size.max(1);
        let (coverage, ledger) = (&session.coverage, &session.ledger);
        session.frontier.retain(|e| !self.selector.candidates(&e.path, coverage, ledger).is_empty());

        // Index of the first queued flip, per frontier entry.
        let mut cut: Vec<Option<usize>> = vec![None; session.frontier.len()];
        for retried in [false, true] {
            for i in (0..session.frontier.len()).rev() {
                let hint = session.frontier[i].input.clone();
                let candidates = self.selector.candidates(&session.frontier[i].path, &session.coverage, &session.ledger);
                for divergence in candidates {
                    if cut[i].is_some_and(|c| divergence.index > c) {
                        continue;
                    }
                    // Earlier attempts of this pass may have changed its status.
                    let retries = session.ledger.retries(&divergence.target);
                    if (retries > 0) != retried || session.ledger.is_excluded(&divergence.target) {
                        continue;
                    }
                    if self.out_of_time(session) {
                        return Refill::OutOfTime;
                    }
                    if session.solver_calls >= self.config.iterations {
                        return Refill::OutOfCalls;
                    }

                    session.solver_calls += 1;
                    debug!("flip {} via {}", divergence.target, divergence.formula);
                    match self.gateway.resolve(&divergence.formula, &hint, self.solve_timeout(session)) {
                        Resolution::Solved { input, solutions } => {
                            if session.executed.contains(&input) || session.queue.iter().any(|q| q.input == input) {
                                warn!("solver repeated input {} for {}", input, divergence.target);
                                session.ledger.record_unknown(divergence.target, "solver repeated an explored input");
                                continue;
                            }
                            match solutions {
                                Some(count) => info!("flip {} with {} ({} solutions)", divergence.target, input, count),
                                None => info!("flip {} with {}", divergence.target, input),
                            }
                            cut[i] = Some(cut[i].map_or(divergence.index, |c| c.min(divergence.index)));
                            session.ledger.mark_pending(divergence.target.clone());
                            session.generated.push(input.clone());
                            session.queue.push_back(Queued {
                                input,
                                aim: Some(divergence.target),
                            });
                            if session.queue.len() >= batch_size {
                                return Refill::Queued;
                            }
                        }
                        Resolution::Unreachable => {
                            info!("{} is unreachable", divergence.target);
                            session.ledger.mark_unreachable(divergence.target);
                        }
                        Resolution::Unresolved(reason) => {
                            let given_up = session.ledger.record_unknown(divergence.target.clone(), &reason);
                            info!(
                                "{} unresolved ({}){}",
                                divergence.target,
                                reason,
                                if given_up { ", giving up" } else { "" }
                            );
                        }
                    }
                }
            }
        }

        if session.queue.is_empty() {
            Refill::Exhausted
        } else {
            Refill::Queued
        }
    }
}

/// Explores `target` from `seed` with the BDD solver and default settings.
pub fn search(target: &Target, seed: Input, iteration_budget: usize, per_solve_timeout: Duration) -> SearchReport {
    let config = SearchConfig {
        iterations: iteration_budget,
        solve_timeout: per_solve_timeout,
        ..SearchConfig::default()
    };
    Search::with_default_solver(config).run(target, seed)
}
