//! Translation between divergence formulas and new inputs.

use std::time::Duration;

use log::{debug, warn};
use num_bigint::BigUint;

use crate::solver::{Formula, Model, Query, Solver, Verdict};
use crate::state::Input;

/// What became of one divergence formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A new input satisfying the formula, with the model count if known.
    Solved { input: Input, solutions: Option<BigUint> },
    /// The formula is unsatisfiable.
    Unreachable,
    /// Undecided or unusable answer; the reason is kept for the report.
    Unresolved(String),
}

/// Hands formulas to a solver and validates what comes back.
#[derive(Debug, Clone)]
pub struct SolverGateway<S> {
    solver: S,
}

impl<S: Solver> SolverGateway<S> {
    pub fn new(solver: S) -> Self {
        Self { solver }
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn resolve(&self, formula: &Formula, seed: &Input, timeout: Duration) -> Resolution {
        let signature = seed.signature();
        let query = Query {
            formula,
            signature: &signature,
            hint: seed,
            timeout,
        };
        let resolution = match self.solver.check(&query) {
            Verdict::Sat { model, solutions } => match complete(&model, seed) {
                Ok(input) => match formula.evaluate(&input) {
                    Ok(true) => Resolution::Solved { input, solutions },
                    Ok(false) => {
                        warn!("{} model {} does not satisfy {}", self.solver.name(), input, formula);
                        Resolution::Unresolved("model does not satisfy the formula".to_string())
                    }
                    Err(e) => {
                        warn!("{} model {} cannot be checked: {}", self.solver.name(), input, e);
                        Resolution::Unresolved(e.to_string())
                    }
                },
                Err(reason) => {
                    warn!("{} returned a malformed model: {}", self.solver.name(), reason);
                    Resolution::Unresolved(reason)
                }
            },
            Verdict::Unsat => Resolution::Unreachable,
            Verdict::Unknown(reason) => Resolution::Unresolved(reason),
        };
        debug!("resolve {} -> {:?}", formula, resolution);
        resolution
    }
}

/// Seed values overridden by the model.
fn complete(model: &Model, seed: &Input) -> Result<Input, String> {
    let mut input = seed.clone();
    for (name, value) in model {
        match seed.get(name) {
            None => return Err(format!("unknown variable `{}`", name)),
            Some(old) if old.ty() != value.ty() => {
                return Err(format!("variable `{}` is {} but the model assigns {} `{}`", name, old.ty(), value.ty(), value))
            }
            Some(_) => input.set(name.clone(), *value),
        }
    }
    Ok(input)
}
