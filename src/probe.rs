//! Instrumentation boundary between a target and the engine.
//!
//! A target is ordinary Rust code that reports its own control flow through a
//! [`Probe`]: every executed statement, every conditional branch with its
//! predicate, and every input read. The probe forwards these events, in
//! execution order, to an [`EventSource`] consumer and enforces the
//! [`ExecutionBudget`] of the run.

use std::mem;
use std::time::{Duration, Instant};

use log::trace;

use crate::error::Fault;
use crate::location::{FunctionId, Location};
use crate::path::BranchSite;
use crate::state::SymbolicState;
use crate::value::SymbolicValue;

/// Consumer of execution events.
pub trait EventSource {
    fn on_statement(&mut self, location: &Location);

    fn on_branch(&mut self, site: &BranchSite, predicate: &SymbolicValue, outcome: bool);
}

/// Upper bound on a single run of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionBudget {
    /// Maximum number of probe events.
    pub max_steps: u64,
    /// Maximum wall-clock time.
    pub max_duration: Option<Duration>,
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            max_duration: Some(Duration::from_secs(5)),
        }
    }
}

/// Branch lines within the current function.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Site {
    pub line: u32,
    pub on_true: u32,
    pub on_false: u32,
}

impl Site {
    pub const fn new(line: u32, on_true: u32, on_false: u32) -> Self {
        Self { line, on_true, on_false }
    }
}

/// Handle through which a running target reports events.
pub struct Probe<'a> {
    events: &'a mut dyn EventSource,
    state: &'a SymbolicState,
    function: FunctionId,
    budget: ExecutionBudget,
    steps: u64,
    started: Instant,
    exhausted: bool,
}

impl<'a> Probe<'a> {
    pub fn new(function: FunctionId, state: &'a SymbolicState, events: &'a mut dyn EventSource, budget: ExecutionBudget) -> Self {
        Self {
            events,
            state,
            function,
            budget,
            steps: 0,
            started: Instant::now(),
            exhausted: false,
        }
    }

    /// Function the next events are attributed to.
    pub fn function(&self) -> &FunctionId {
        &self.function
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Once exhausted, every further event fails as well.
    fn tick(&mut self) -> Result<(), Fault> {
        self.steps += 1;
        let out_of_time = self.budget.max_duration.is_some_and(|d| self.started.elapsed() > d);
        if self.exhausted || self.steps > self.budget.max_steps || out_of_time {
            self.exhausted = true;
            return Err(Fault::BudgetExhausted { steps: self.steps - 1 });
        }
        Ok(())
    }

    /// Symbolic value of an input variable.
    pub fn input(&self, name: &str) -> Result<SymbolicValue, Fault> {
        self.state.get(name).cloned().ok_or_else(|| Fault::UnknownInput(name.to_string()))
    }

    /// Reports execution of the statement at `line`.
    pub fn stmt(&mut self, line: u32) -> Result<(), Fault> {
        self.tick()?;
        let location = self.function.at(line);
        trace!("stmt {}", location);
        self.events.on_statement(&location);
        Ok(())
    }

    /// Reports the branch at `site.line` and returns the outcome to follow.
    ///
    /// The branch line itself counts as an executed statement.
    pub fn branch(&mut self, site: Site, predicate: &SymbolicValue) -> Result<bool, Fault> {
        self.stmt(site.line)?;
        let outcome = predicate
            .value()
            .as_bool()
            .ok_or(Fault::NonBooleanPredicate { line: site.line })?;
        let site = BranchSite::new(self.function.at(site.line), self.function.at(site.on_true), self.function.at(site.on_false));
        trace!("branch {} = {}", site.at, outcome);
        self.events.on_branch(&site, predicate, outcome);
        Ok(outcome)
    }

    /// Evaluates a branch whose location cannot be resolved.
    ///
    /// Nothing is recorded: neither the trace nor the path condition sees it.
    pub fn branch_opaque(&mut self, predicate: &SymbolicValue) -> Result<bool, Fault> {
        self.tick()?;
        predicate.value().as_bool().ok_or(Fault::NonBooleanPredicate { line: 0 })
    }

    /// Attributes the events of `body` to `function`, as a call would.
    pub fn within<R>(&mut self, function: &FunctionId, body: impl FnOnce(&mut Self) -> R) -> R {
        let caller = mem::replace(&mut self.function, function.clone());
        let result = body(self);
        self.function = caller;
        result
    }
}
