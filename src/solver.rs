//! Decision procedures for path formulas.
//!
//! A [`Solver`] answers one [`Query`] at a time and keeps no state between
//! calls. The default implementation, [`BddSolver`], bit-blasts the formula
//! into a BDD; [`crate::smtlib::ProcessSolver`] delegates to an external SMT
//! solver instead.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use log::debug;
use num_bigint::BigUint;

use crate::bdd::{Bdd, BddConfig};
use crate::bitvec::{Blaster, Word, WIDTH};
use crate::error::{EvalError, SolverError};
use crate::expr::{BinaryOp, CompareOp, Expr, LogicOp};
use crate::reference::Ref;
use crate::state::Input;
use crate::value::{Value, ValueType};

/// Conjunction of boolean expressions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formula {
    clauses: Vec<Expr>,
}

impl Formula {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: Expr) {
        self.clauses.push(clause);
    }

    pub fn clauses(&self) -> &[Expr] {
        &self.clauses
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Whether every clause holds under `input`.
    pub fn evaluate(&self, input: &Input) -> Result<bool, EvalError> {
        for clause in &self.clauses {
            match clause.evaluate(input)? {
                Value::Bool(true) => {}
                Value::Bool(false) => return Ok(false),
                Value::Int(_) => {
                    return Err(EvalError::TypeMismatch {
                        context: format!("clause `{}`", clause),
                        expected: ValueType::Bool,
                        found: ValueType::Int,
                    })
                }
            }
        }
        Ok(true)
    }
}

impl FromIterator<Expr> for Formula {
    fn from_iter<T: IntoIterator<Item = Expr>>(iter: T) -> Self {
        Self {
            clauses: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return write!(f, "true");
        }
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, " && ")?;
            }
            write!(f, "{}", clause)?;
        }
        Ok(())
    }
}

/// One request to a decision procedure.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    pub formula: &'a Formula,
    /// Declared input variables and their types.
    pub signature: &'a [(String, ValueType)],
    /// Input the formula was derived from; solvers may use it to pick nearby models.
    pub hint: &'a Input,
    pub timeout: Duration,
}

/// Assignment returned by a solver.
pub type Model = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Satisfiable, with a model and, optionally, the number of models.
    Sat { model: Model, solutions: Option<BigUint> },
    Unsat,
    /// Undecided: timeout, resource limit, or solver failure.
    Unknown(String),
}

pub trait Solver: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, query: &Query<'_>) -> Verdict;
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn check(&self, query: &Query<'_>) -> Verdict {
        (**self).check(query)
    }
}

#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Node budget of the BDD manager per query.
    pub node_limit: usize,
    /// Count satisfying assignments of satisfiable queries.
    pub count_models: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            node_limit: 1 << 21,
            count_models: false,
        }
    }
}

/// Bit-blasting solver over 64-bit two's-complement integers.
///
/// Variable order: boolean inputs first, then integer bits from the most
/// significant down, interleaved across integer inputs.
#[derive(Debug, Clone, Default)]
pub struct BddSolver {
    config: SolverConfig,
}

#[derive(Debug, Clone)]
enum Term {
    Int(Word),
    Bool(Ref),
}

struct Layout {
    names: Vec<String>,
    num_vars: usize,
    terms: HashMap<String, (ValueType, Term)>,
}

impl Layout {
    fn new(bdd: &Bdd, blaster: &Blaster<'_>, signature: &[(String, ValueType)]) -> Result<Self, SolverError> {
        let bools: Vec<usize> = (0..signature.len()).filter(|&i| signature[i].1 == ValueType::Bool).collect();
        let ints: Vec<usize> = (0..signature.len()).filter(|&i| signature[i].1 == ValueType::Int).collect();
        let (b, m) = (bools.len() as u32, ints.len() as u32);

        let mut terms = HashMap::new();
        for (j, &i) in bools.iter().enumerate() {
            let var = j as u32 + 1;
            terms.insert(signature[i].0.clone(), (ValueType::Bool, Term::Bool(bdd.mk_var(var)?)));
        }
        for (k, &i) in ints.iter().enumerate() {
            let var_of_bit = |bit: usize| b + (WIDTH - 1 - bit) as u32 * m + k as u32 + 1;
            terms.insert(signature[i].0.clone(), (ValueType::Int, Term::Int(blaster.variable(var_of_bit)?)));
        }

        Ok(Self {
            names: signature.iter().map(|(n, _)| n.clone()).collect(),
            num_vars: bools.len() + WIDTH * ints.len(),
            terms,
        })
    }

    fn num_vars(&self) -> usize {
        self.num_vars
    }
}

impl BddSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn encode(&self, bdd: &Bdd, blaster: &Blaster<'_>, layout: &Layout, expr: &Expr) -> Result<Term, SolverError> {
        let int = |e: &Expr| -> Result<Word, SolverError> {
            match self.encode(bdd, blaster, layout, e)? {
                Term::Int(w) => Ok(w),
                Term::Bool(_) => Err(SolverError::IllTyped(format!("expected int, found bool in `{}`", e))),
            }
        };
        let boolean = |e: &Expr| -> Result<Ref, SolverError> {
            match self.encode(bdd, blaster, layout, e)? {
                Term::Bool(r) => Ok(r),
                Term::Int(_) => Err(SolverError::IllTyped(format!("expected bool, found int in `{}`", e))),
            }
        };

        let term = match expr {
            Expr::Const(Value::Int(x)) => Term::Int(blaster.constant(*x)),
            Expr::Const(Value::Bool(b)) => Term::Bool(bdd.constant(*b)),
            Expr::Input(name, ty) => match layout.terms.get(name) {
                Some((declared, term)) if declared == ty => term.clone(),
                Some((declared, _)) => {
                    return Err(SolverError::IllTyped(format!("input `{}` used as {} but declared {}", name, ty, declared)))
                }
                None => return Err(SolverError::IllTyped(format!("undeclared input `{}`", name))),
            },
            Expr::Neg(e) => Term::Int(blaster.neg(&int(&**e)?)?),
            Expr::Not(e) => Term::Bool(bdd.apply_not(boolean(&**e)?)),
            Expr::Binary(op, l, r) => {
                let (a, b) = (int(&**l)?, int(&**r)?);
                Term::Int(match op {
                    BinaryOp::Add => blaster.add(&a, &b)?,
                    BinaryOp::Sub => blaster.sub(&a, &b)?,
                    BinaryOp::Mul => blaster.mul(&a, &b)?,
                })
            }
            Expr::Compare(op, l, r) => {
                let (a, b) = (int(&**l)?, int(&**r)?);
                Term::Bool(match op {
                    CompareOp::Lt => blaster.slt(&a, &b)?,
                    CompareOp::Le => blaster.sle(&a, &b)?,
                    CompareOp::Gt => blaster.slt(&b, &a)?,
                    CompareOp::Ge => blaster.sle(&b, &a)?,
                    CompareOp::Eq => blaster.eq(&a, &b)?,
                    CompareOp::Ne => -blaster.eq(&a, &b)?,
                })
            }
            Expr::Logic(op, l, r) => {
                let (a, b) = (boolean(&**l)?, boolean(&**r)?);
                Term::Bool(match op {
                    LogicOp::And => bdd.apply_and(a, b)?,
                    LogicOp::Or => bdd.apply_or(a, b)?,
                })
            }
        };
        Ok(term)
    }

    /// Extracts the model nearest to the hint.
    ///
    /// Inputs are fixed one at a time in signature order, each under the
    /// choices made for the ones before it. A boolean input keeps its hint value
    /// when possible. An integer input takes the least feasible value at or
    /// above its hint or the greatest one at or below it, whichever is closer,
    /// the lower one on a tie.
    fn extract(&self, bdd: &Bdd, blaster: &Blaster<'_>, f: Ref, layout: &Layout, hint: &Input) -> Result<Model, SolverError> {
        let mut g = f;
        let mut model = Model::new();
        for name in &layout.names {
            let Some((_, term)) = layout.terms.get(name) else {
                continue;
            };
            match term {
                Term::Bool(var) => {
                    let preferred = hint.get(name).and_then(Value::as_bool).unwrap_or(false);
                    let literal = if preferred { *var } else { -*var };
                    let (value, rest) = restrict(bdd, g, literal, preferred)?;
                    g = rest;
                    model.insert(name.clone(), Value::Bool(value));
                }
                Term::Int(word) => {
                    let seed = hint.get(name).and_then(Value::as_int).unwrap_or(0);
                    let pivot = blaster.constant(seed);
                    let above = bdd.apply_and(g, blaster.sle(&pivot, word)?)?;
                    let below = bdd.apply_and(g, blaster.sle(word, &pivot)?)?;
                    let distance = |x: i64| (x as i128 - seed as i128).unsigned_abs();
                    let nearest = match (extreme(bdd, below, word, true)?, extreme(bdd, above, word, false)?) {
                        (Some(low), Some(high)) if distance(high.0) < distance(low.0) => high,
                        (Some(low), _) => low,
                        (None, Some(high)) => high,
                        (None, None) => return Err(SolverError::IllTyped(format!("no value left for `{}`", name))),
                    };
                    g = nearest.1;
                    model.insert(name.clone(), Value::Int(nearest.0));
                }
            }
        }
        Ok(model)
    }

    /// Decides the query: `Ok(None)` for unsat.
    pub fn solve(&self, query: &Query<'_>) -> Result<Option<(Model, Option<BigUint>)>, SolverError> {
        let bdd = Bdd::new(BddConfig {
            node_limit: self.config.node_limit,
            deadline: Some(Instant::now() + query.timeout),
        });
        let blaster = Blaster::new(&bdd);
        let layout = Layout::new(&bdd, &blaster, query.signature)?;

        let mut f = bdd.one;
        for clause in query.formula.clauses() {
            let c = match self.encode(&bdd, &blaster, &layout, clause)? {
                Term::Bool(c) => c,
                Term::Int(_) => return Err(SolverError::IllTyped(format!("clause `{}` is not boolean", clause))),
            };
            f = bdd.apply_and(f, c)?;
            if bdd.is_zero(f) {
                debug!("solve: unsat at clause `{}`, {} nodes", clause, bdd.num_nodes());
                return Ok(None);
            }
        }
        debug!("solve: sat, {} nodes", bdd.num_nodes());

        let solutions = self.config.count_models.then(|| bdd.sat_count(f, layout.num_vars()));
        let model = self.extract(&bdd, &blaster, f, &layout, query.hint)?;
        Ok(Some((model, solutions)))
    }
}

/// Conjoins `literal` if that stays satisfiable, its negation otherwise.
///
/// Returns the polarity kept, given that `literal` stands for `polarity`.
fn restrict(bdd: &Bdd, f: Ref, literal: Ref, polarity: bool) -> Result<(bool, Ref), SolverError> {
    let kept = bdd.apply_and(f, literal)?;
    if bdd.is_zero(kept) {
        Ok((!polarity, bdd.apply_and(f, -literal)?))
    } else {
        Ok((polarity, kept))
    }
}

/// Greatest (or least) value of `word` among the models of `f`, and `f` restricted to it.
fn extreme(bdd: &Bdd, f: Ref, word: &Word, greatest: bool) -> Result<Option<(i64, Ref)>, SolverError> {
    if bdd.is_zero(f) {
        return Ok(None);
    }
    let mut g = f;
    let mut value = 0u64;
    for bit in (0..WIDTH).rev() {
        // A set sign bit makes the value smaller, any other set bit larger.
        let preferred = greatest != (bit == WIDTH - 1);
        let literal = if preferred { word.bit(bit) } else { -word.bit(bit) };
        let (set, rest) = restrict(bdd, g, literal, preferred)?;
        g = rest;
        if set {
            value |= 1 << bit;
        }
    }
    Ok(Some((value as i64, g)))
}

impl Solver for BddSolver {
    fn name(&self) -> &str {
        "bdd"
    }

    fn check(&self, query: &Query<'_>) -> Verdict {
        match self.solve(query) {
            Ok(Some((model, solutions))) => Verdict::Sat { model, solutions },
            Ok(None) => Verdict::Unsat,
            Err(e) => {
                debug!("check: unknown ({})", e);
                Verdict::Unknown(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn n() -> Expr {
        Expr::input("n", ValueType::Int)
    }

    fn cmp(op: CompareOp, lhs: Expr, rhs: i64) -> Expr {
        Expr::compare(op, lhs, Expr::int(rhs))
    }

    fn check(solver: &BddSolver, formula: &Formula, hint: &Input) -> Verdict {
        let signature = hint.signature();
        solver.check(&Query {
            formula,
            signature: &signature,
            hint,
            timeout: Duration::from_secs(10),
        })
    }

    fn model_of(verdict: Verdict) -> Model {
        match verdict {
            Verdict::Sat { model, .. } => model,
            v => panic!("expected sat, got {:?}", v),
        }
    }

    #[test]
    fn test_negative_closest_to_seed() {
        let solver = BddSolver::default();
        let seed = Input::new().with("n", 5);
        let formula = Formula::from_iter([cmp(CompareOp::Lt, n(), 0)]);
        let model = model_of(check(&solver, &formula, &seed));
        assert_eq!(model["n"], Value::Int(-1));
    }

    #[test]
    fn test_equality() {
        let solver = BddSolver::default();
        let seed = Input::new().with("n", 5);
        let formula = Formula::from_iter([cmp(CompareOp::Ge, n(), 0), cmp(CompareOp::Eq, n(), 0)]);
        assert_eq!(model_of(check(&solver, &formula, &seed))["n"], Value::Int(0));
    }

    #[test]
    fn test_above_closest_to_seed() {
        let solver = BddSolver::default();
        let seed = Input::new().with("n", 5);
        let formula = Formula::from_iter([cmp(CompareOp::Gt, n(), 100)]);
        assert_eq!(model_of(check(&solver, &formula, &seed))["n"], Value::Int(101));
    }

    #[test]
    fn test_nearest_of_two_islands() {
        let solver = BddSolver::default();
        let islands = Formula::from_iter([Expr::logic(LogicOp::Or, cmp(CompareOp::Eq, n(), 3), cmp(CompareOp::Eq, n(), 6))]);
        let nearest = |seed: i64| model_of(check(&solver, &islands, &Input::new().with("n", seed)))["n"];
        assert_eq!(nearest(4), Value::Int(3));
        assert_eq!(nearest(5), Value::Int(6));
        assert_eq!(nearest(-100), Value::Int(3));
        assert_eq!(nearest(i64::MAX), Value::Int(6));

        // Equally far on both sides.
        let pair = Formula::from_iter([Expr::logic(LogicOp::Or, cmp(CompareOp::Eq, n(), -2), cmp(CompareOp::Eq, n(), 2))]);
        assert_eq!(model_of(check(&solver, &pair, &Input::new().with("n", 0)))["n"], Value::Int(-2));
    }

    #[test]
    fn test_unsat() {
        let solver = BddSolver::default();
        let seed = Input::new().with("n", 5);
        let formula = Formula::from_iter([cmp(CompareOp::Lt, n(), 0), cmp(CompareOp::Gt, n(), 3)]);
        assert_eq!(check(&solver, &formula, &seed), Verdict::Unsat);
    }

    #[test]
    fn test_arithmetic_and_two_inputs() {
        let solver = BddSolver::default();
        let seed = Input::new().with("x", 1).with("y", 1);
        let x = Expr::input("x", ValueType::Int);
        let y = Expr::input("y", ValueType::Int);
        // x + y == 10 && x - y == 4
        let formula = Formula::from_iter([
            Expr::compare(CompareOp::Eq, Expr::binary(BinaryOp::Add, x.clone(), y.clone()), Expr::int(10)),
            Expr::compare(CompareOp::Eq, Expr::binary(BinaryOp::Sub, x, y), Expr::int(4)),
        ]);
        let model = model_of(check(&solver, &formula, &seed));
        assert_eq!(model["x"], Value::Int(7));
        assert_eq!(model["y"], Value::Int(3));
    }

    #[test]
    fn test_boolean_input() {
        let solver = BddSolver::default();
        let seed = Input::new().with("flag", false).with("n", 0);
        let flag = Expr::input("flag", ValueType::Bool);
        let formula = Formula::from_iter([Expr::logic(LogicOp::Or, flag.clone(), cmp(CompareOp::Lt, n(), 0)), cmp(CompareOp::Ge, n(), 0)]);
        let model = model_of(check(&solver, &formula, &seed));
        assert_eq!(model["flag"], Value::Bool(true));
        assert_eq!(model["n"], Value::Int(0));
        let completed: Input = model.into_iter().collect();
        assert_eq!(formula.evaluate(&completed), Ok(true));
    }

    #[test]
    fn test_count_models() {
        let solver = BddSolver::new(SolverConfig {
            count_models: true,
            ..SolverConfig::default()
        });
        let seed = Input::new().with("n", 5);
        let formula = Formula::from_iter([cmp(CompareOp::Lt, n(), 0)]);
        match check(&solver, &formula, &seed) {
            Verdict::Sat { solutions, .. } => assert_eq!(solutions, Some(BigUint::from(1u8) << 63)),
            v => panic!("expected sat, got {:?}", v),
        }
    }

    #[test]
    fn test_node_limit_is_unknown() {
        let solver = BddSolver::new(SolverConfig {
            node_limit: 256,
            count_models: false,
        });
        let seed = Input::new().with("x", 3).with("y", 5);
        let x = Expr::input("x", ValueType::Int);
        let y = Expr::input("y", ValueType::Int);
        let formula = Formula::from_iter([Expr::compare(CompareOp::Eq, Expr::binary(BinaryOp::Mul, x, y), Expr::int(15))]);
        assert!(matches!(check(&solver, &formula, &seed), Verdict::Unknown(_)));
    }

    #[test]
    fn test_ill_typed_is_unknown() {
        let solver = BddSolver::default();
        let seed = Input::new().with("n", 5);
        let formula = Formula::from_iter([Expr::input("n", ValueType::Bool)]);
        assert!(matches!(check(&solver, &formula, &seed), Verdict::Unknown(_)));
    }
}
