//! Concolic execution of one run.
//!
//! The executor drives a [`Target`] on a concrete input while the trace
//! recorder and the path condition observe the same event stream. It owns
//! nothing across runs and never touches session coverage.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use log::debug;

use crate::error::Fault;
use crate::location::{FunctionId, Location};
use crate::path::{BranchSite, PathCondition, PathConstraint};
use crate::probe::{EventSource, ExecutionBudget, Probe};
use crate::state::{Input, SymbolicState};
use crate::trace::{Trace, TraceRecorder};
use crate::value::{SymbolicValue, Value};

type Body = dyn Fn(&mut Probe<'_>) -> Result<Option<SymbolicValue>, Fault> + Send + Sync;

/// An instrumented function under test.
pub struct Target {
    function: FunctionId,
    excluded: Vec<FunctionId>,
    body: Box<Body>,
}

impl Target {
    pub fn new(name: &str, body: impl Fn(&mut Probe<'_>) -> Result<Option<SymbolicValue>, Fault> + Send + Sync + 'static) -> Self {
        Self::with_function(FunctionId::fresh(name), body)
    }

    pub fn with_function(
        function: FunctionId,
        body: impl Fn(&mut Probe<'_>) -> Result<Option<SymbolicValue>, Fault> + Send + Sync + 'static,
    ) -> Self {
        Self {
            function,
            excluded: Vec::new(),
            body: Box::new(body),
        }
    }

    /// Drops the events of an instrumentation helper from traces and paths.
    pub fn excluding(mut self, function: FunctionId) -> Self {
        self.excluded.push(function);
        self
    }

    pub fn function(&self) -> &FunctionId {
        &self.function
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("function", &self.function)
            .field("excluded", &self.excluded)
            .finish_non_exhaustive()
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Returned(Option<Value>),
    Faulted(Fault),
}

impl RunOutcome {
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            RunOutcome::Faulted(fault) => Some(fault),
            RunOutcome::Returned(_) => None,
        }
    }
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct Run {
    pub input: Input,
    pub trace: Trace,
    pub path: PathCondition,
    pub outcome: RunOutcome,
    pub steps: u64,
    pub duration: Duration,
}

impl Run {
    /// Whether the run took `outcome` at the branch tested at `at`.
    pub fn took(&self, at: &Location, outcome: bool) -> bool {
        self.path.iter().any(|c| &c.site.at == at && c.taken == outcome)
    }
}

/// Feeds one event stream to both the trace and the path condition.
struct Lockstep {
    recorder: TraceRecorder,
    path: PathCondition,
}

impl EventSource for Lockstep {
    fn on_statement(&mut self, location: &Location) {
        self.recorder.on_statement(location);
    }

    fn on_branch(&mut self, site: &BranchSite, predicate: &SymbolicValue, outcome: bool) {
        if self.recorder.accepts(&site.at.function) {
            self.path.push(PathConstraint {
                site: site.clone(),
                predicate: predicate.clone(),
                taken: outcome,
            });
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConcolicExecutor {
    budget: ExecutionBudget,
}

impl ConcolicExecutor {
    pub fn new(budget: ExecutionBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> &ExecutionBudget {
        &self.budget
    }

    fn recorder_for(target: &Target) -> TraceRecorder {
        let mut recorder = TraceRecorder::new();
        for function in &target.excluded {
            recorder.ignore(function.clone());
        }
        recorder
    }

    fn drive<E: EventSource>(&self, target: &Target, input: &Input, events: &mut E) -> (RunOutcome, u64) {
        let state = SymbolicState::new(input);
        let mut probe = Probe::new(target.function.clone(), &state, events, self.budget);
        let result = panic::catch_unwind(AssertUnwindSafe(|| (target.body)(&mut probe)));
        let outcome = match result {
            Ok(Ok(value)) => RunOutcome::Returned(value.map(|v| v.value())),
            Ok(Err(fault)) => RunOutcome::Faulted(fault),
            Err(payload) => RunOutcome::Faulted(Fault::Panicked(panic_message(payload.as_ref()))),
        };
        (outcome, probe.steps())
    }

    /// Runs the target on `input`, recording its trace and path condition.
    pub fn run(&self, target: &Target, input: &Input) -> Run {
        let started = Instant::now();
        let mut lockstep = Lockstep {
            recorder: Self::recorder_for(target),
            path: PathCondition::new(),
        };
        let (outcome, steps) = self.drive(target, input, &mut lockstep);
        let run = Run {
            input: input.clone(),
            trace: lockstep.recorder.finish(),
            path: lockstep.path,
            outcome,
            steps,
            duration: started.elapsed(),
        };
        debug!(
            "run {} on {}: {} statements, {} branches, {:?}",
            target.function,
            input,
            run.trace.len(),
            run.path.len(),
            run.outcome
        );
        run
    }

    /// Runs the target on `input`, recording statements only.
    pub fn trace(&self, target: &Target, input: &Input) -> (Trace, RunOutcome) {
        let mut recorder = Self::recorder_for(target);
        let (outcome, _) = self.drive(target, input, &mut recorder);
        (recorder.finish(), outcome)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::expr::CompareOp;
    use crate::probe::Site;
    use crate::value::ValueType;

    fn abs_target() -> Target {
        Target::new("abs", |p| {
            let x = p.input("x")?;
            if p.branch(Site::new(1, 2, 3), &x.lt(0))? {
                p.stmt(2)?;
                return Ok(Some(-x));
            }
            p.stmt(3)?;
            Ok(Some(x))
        })
    }

    #[test]
    fn test_run_records_trace_and_path() {
        let executor = ConcolicExecutor::default();
        let target = abs_target();
        let f = target.function().clone();

        let run = executor.run(&target, &Input::new().with("x", -4));
        assert_eq!(run.outcome, RunOutcome::Returned(Some(Value::Int(4))));
        assert_eq!(run.trace.locations(), &[f.at(1), f.at(2)]);
        assert_eq!(run.path.len(), 1);
        assert!(run.took(&f.at(1), true));
        assert_eq!(run.path.holds_for(&run.input), Ok(true));

        let (trace, outcome) = executor.trace(&target, &Input::new().with("x", 4));
        assert_eq!(trace.locations(), &[f.at(1), f.at(3)]);
        assert_eq!(outcome, RunOutcome::Returned(Some(Value::Int(4))));
    }

    #[test]
    fn test_loop_iterations_are_separate_constraints() {
        let target = Target::new("countdown", |p| {
            let mut n = p.input("n")?;
            while p.branch(Site::new(1, 2, 3), &n.gt(0))? {
                p.stmt(2)?;
                n = n - 1;
            }
            p.stmt(3)?;
            Ok(None)
        });
        let run = ConcolicExecutor::default().run(&target, &Input::new().with("n", 3));
        let taken: Vec<bool> = run.path.iter().map(|c| c.taken).collect();
        assert_eq!(taken, vec![true, true, true, false]);
        assert_eq!(run.path.get(3).unwrap().effective().unwrap().to_string(), "((((n - 1) - 1) - 1) <= 0)");
    }

    #[test]
    fn test_raised_fault_keeps_partial_results() {
        let target = Target::new("raise", |p| {
            let x = p.input("x")?;
            p.stmt(1)?;
            if p.branch(Site::new(2, 3, 4), &x.eq(7))? {
                p.stmt(3)?;
                return Err(Fault::Raised("seven".to_string()));
            }
            p.stmt(4)?;
            Ok(None)
        });
        let run = ConcolicExecutor::default().run(&target, &Input::new().with("x", 7));
        assert_eq!(run.outcome.fault(), Some(&Fault::Raised("seven".to_string())));
        assert_eq!(run.trace.len(), 3);
        assert_eq!(run.path.len(), 1);
    }

    #[test]
    fn test_panic_is_caught() {
        let target = Target::new("boom", |p| {
            p.stmt(1)?;
            p.stmt(2)?;
            panic!("boom at line 2");
        });
        let run = ConcolicExecutor::default().run(&target, &Input::new());
        assert_eq!(run.outcome, RunOutcome::Faulted(Fault::Panicked("boom at line 2".to_string())));
        assert_eq!(run.trace.len(), 2);
    }

    #[test]
    fn test_operand_misuse_is_a_fault() {
        let target = Target::new("mixup", |p| {
            let flag = p.input("flag")?;
            p.stmt(1)?;
            let negative = flag.try_compare(CompareOp::Lt, 0)?;
            p.branch(Site::new(2, 3, 4), &negative)?;
            Ok(None)
        });
        let run = ConcolicExecutor::default().run(&target, &Input::new().with("flag", true));
        assert_eq!(
            run.outcome,
            RunOutcome::Faulted(Fault::OperandType {
                op: "<".to_string(),
                expected: ValueType::Int,
                found: ValueType::Bool,
            })
        );
        assert_eq!(run.trace.len(), 1);

        let unchecked = Target::new("mixup", |p| {
            let flag = p.input("flag")?;
            p.stmt(1)?;
            p.branch(Site::new(2, 3, 4), &flag.lt(0))?;
            Ok(None)
        });
        let run = ConcolicExecutor::default().run(&unchecked, &Input::new().with("flag", true));
        assert_eq!(
            run.outcome,
            RunOutcome::Faulted(Fault::Panicked("operator `<` expects int operands, found bool".to_string()))
        );
        assert_eq!(run.trace.len(), 1);
    }

    #[test]
    fn test_budget_stops_runaway_target() {
        let target = Target::new("spin", |p| loop {
            p.stmt(1)?;
        });
        let executor = ConcolicExecutor::new(ExecutionBudget {
            max_steps: 50,
            max_duration: None,
        });
        let run = executor.run(&target, &Input::new());
        assert_eq!(run.outcome, RunOutcome::Faulted(Fault::BudgetExhausted { steps: 50 }));
        assert_eq!(run.trace.len(), 50);
    }

    #[test]
    fn test_excluded_helper_is_filtered_by_identity() {
        let helper = FunctionId::fresh("f");
        let inner = helper.clone();
        let target = Target::new("f", move |p| {
            let x = p.input("x")?;
            p.stmt(1)?;
            p.within(&inner, |p| {
                p.stmt(100)?;
                p.branch(Site::new(101, 102, 103), &x.gt(0))
            })?;
            p.stmt(2)?;
            Ok(None)
        })
        .excluding(helper);
        let f = target.function().clone();

        let run = ConcolicExecutor::default().run(&target, &Input::new().with("x", 1));
        assert_eq!(run.trace.locations(), &[f.at(1), f.at(2)]);
        assert!(run.path.is_empty());
    }
}
