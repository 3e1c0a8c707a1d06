//! Branch decisions of one run and their conjunction.

use std::fmt;

use crate::error::EvalError;
use crate::expr::Expr;
use crate::location::{Arc, Location};
use crate::solver::Formula;
use crate::state::{Input, SymbolicState};
use crate::value::{SymbolicValue, Value};

/// A conditional branch: where it is tested and where each outcome continues.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchSite {
    pub at: Location,
    pub on_true: Location,
    pub on_false: Location,
}

impl BranchSite {
    pub fn new(at: Location, on_true: Location, on_false: Location) -> Self {
        Self { at, on_true, on_false }
    }

    /// First location executed after the given outcome.
    pub fn successor(&self, outcome: bool) -> &Location {
        if outcome {
            &self.on_true
        } else {
            &self.on_false
        }
    }

    /// Control-flow arc taken by the given outcome.
    pub fn arc(&self, outcome: bool) -> Arc {
        Arc::new(self.at.clone(), self.successor(outcome).clone())
    }

    pub fn outcome(&self, outcome: bool) -> BranchOutcome {
        BranchOutcome {
            at: self.at.clone(),
            outcome,
        }
    }
}

/// One side of a branch, the unit of exclusion for the search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchOutcome {
    pub at: Location,
    pub outcome: bool,
}

impl fmt::Display for BranchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.at, if self.outcome { "T" } else { "F" })
    }
}

/// A branch as it was taken during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConstraint {
    pub site: BranchSite,
    pub predicate: SymbolicValue,
    pub taken: bool,
}

impl PathConstraint {
    /// The constraint contributed to the path condition, `None` if the
    /// predicate does not depend on any input.
    pub fn effective(&self) -> Option<Expr> {
        let expr = self.predicate.expr()?;
        Some(if self.taken { expr.clone() } else { expr.negate() })
    }

    /// Constraint forcing the opposite outcome.
    pub fn flipped(&self) -> Option<Expr> {
        let expr = self.predicate.expr()?;
        Some(if self.taken { expr.negate() } else { expr.clone() })
    }

    pub fn outcome(&self) -> BranchOutcome {
        self.site.outcome(self.taken)
    }
}

impl fmt::Display for PathConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.site.at, self.predicate, self.taken)
    }
}

/// Branch decisions of one run in execution order, loop iterations included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathCondition {
    constraints: Vec<PathConstraint>,
}

impl PathCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constraint: PathConstraint) {
        self.constraints.push(constraint);
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PathConstraint> {
        self.constraints.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathConstraint> + '_ {
        self.constraints.iter()
    }

    /// Conjunction of the effective constraints strictly before `index`.
    pub fn prefix(&self, index: usize) -> Formula {
        self.constraints[..index].iter().filter_map(PathConstraint::effective).collect()
    }

    /// Conjunction of all effective constraints.
    pub fn conjunction(&self) -> Formula {
        self.prefix(self.constraints.len())
    }

    /// Whether `input` satisfies every effective constraint.
    pub fn holds_for(&self, input: &Input) -> Result<bool, EvalError> {
        let state = SymbolicState::new(input);
        for constraint in &self.constraints {
            if let Some(effective) = constraint.effective() {
                if state.eval(&effective)?.value() != Value::Bool(true) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

impl<'a> IntoIterator for &'a PathCondition {
    type Item = &'a PathConstraint;
    type IntoIter = std::slice::Iter<'a, PathConstraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.constraints.iter()
    }
}
