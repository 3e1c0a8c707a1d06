//! Error types.
//!
//! Faults describe what happened to one concrete run of a target; they are run
//! outcomes and never abort a search. Solver errors stay inside the oracle and
//! surface as an `Unknown` verdict.

use thiserror::Error;

use crate::value::ValueType;

/// Abnormal termination of a target run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// The target reported an error of its own.
    #[error("target raised: {0}")]
    Raised(String),
    /// The target panicked; the payload message is kept.
    #[error("target panicked: {0}")]
    Panicked(String),
    /// The step or wall-clock budget of the run ran out.
    #[error("execution budget exhausted after {steps} steps")]
    BudgetExhausted { steps: u64 },
    /// The target asked for an input that was never declared.
    #[error("unknown input `{0}`")]
    UnknownInput(String),
    /// An operator was applied to an operand of the wrong type.
    #[error("operator `{op}` expects {expected} operands, found {found}")]
    OperandType {
        op: String,
        expected: ValueType,
        found: ValueType,
    },
    /// A branch was reported with a non-boolean predicate.
    #[error("branch predicate at line {line} is not boolean")]
    NonBooleanPredicate { line: u32 },
}

/// Failure to evaluate an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unknown input `{0}`")]
    UnknownInput(String),
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: ValueType,
        found: ValueType,
    },
}

/// Resource exhaustion or unsupported input inside a decision procedure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("node limit of {0} BDD nodes reached")]
    NodeLimit(usize),
    #[error("solver deadline expired")]
    Timeout,
    #[error("ill-typed formula: {0}")]
    IllTyped(String),
    #[error("external solver failed: {0}")]
    External(String),
}
