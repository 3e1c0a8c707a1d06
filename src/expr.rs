//! Expression trees over named input variables.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::EvalError;
use crate::state::Input;
use crate::value::{Value, ValueType};

/// Integer arithmetic operators (wrapping).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
}

impl BinaryOp {
    pub fn apply(self, a: i64, b: i64) -> i64 {
        match self {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
        }
    }
}

/// Signed comparison operators.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Lt, // <
    Le, // <=
    Gt, // >
    Ge, // >=
    Eq, // ==
    Ne, // !=
}

impl CompareOp {
    /// Returns the operator of the logical negation.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
        }
    }

    pub fn apply(self, a: i64, b: i64) -> bool {
        match self {
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

/// Boolean connectives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LogicOp {
    And,
    Or,
}

impl LogicOp {
    pub fn apply(self, a: bool, b: bool) -> bool {
        match self {
            LogicOp::And => a && b,
            LogicOp::Or => a || b,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            LogicOp::And => "&&",
            LogicOp::Or => "||",
        }
    }
}

/// Expression over named inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Constant leaf.
    Const(Value),
    /// Input variable leaf.
    Input(String, ValueType),
    /// Wrapping integer negation.
    Neg(Box<Expr>),
    /// Logical negation.
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Logic(LogicOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn int(x: i64) -> Self {
        Expr::Const(Value::Int(x))
    }

    pub fn boolean(b: bool) -> Self {
        Expr::Const(Value::Bool(b))
    }

    pub fn input(name: impl Into<String>, ty: ValueType) -> Self {
        Expr::Input(name.into(), ty)
    }

    pub fn neg(e: Expr) -> Self {
        Expr::Neg(Box::new(e))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn compare(op: CompareOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Compare(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn logic(op: LogicOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Logic(op, Box::new(lhs), Box::new(rhs))
    }

    /// Logical negation, pushed into comparisons and double negations.
    pub fn negate(&self) -> Self {
        match self {
            Expr::Const(Value::Bool(b)) => Expr::boolean(!b),
            Expr::Not(e) => (**e).clone(),
            Expr::Compare(op, l, r) => Expr::Compare(op.negate(), l.clone(), r.clone()),
            e => Expr::Not(Box::new(e.clone())),
        }
    }

    /// Static type of the expression (assuming it is well-typed).
    pub fn ty(&self) -> ValueType {
        match self {
            Expr::Const(v) => v.ty(),
            Expr::Input(_, ty) => *ty,
            Expr::Neg(_) | Expr::Binary(..) => ValueType::Int,
            Expr::Not(_) | Expr::Compare(..) | Expr::Logic(..) => ValueType::Bool,
        }
    }

    /// Names of the inputs the expression mentions.
    pub fn inputs(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_inputs(&mut names);
        names
    }

    fn collect_inputs<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Const(_) => {}
            Expr::Input(name, _) => {
                names.insert(name.as_str());
            }
            Expr::Neg(e) | Expr::Not(e) => e.collect_inputs(names),
            Expr::Binary(_, l, r) | Expr::Compare(_, l, r) | Expr::Logic(_, l, r) => {
                l.collect_inputs(names);
                r.collect_inputs(names);
            }
        }
    }

    /// Evaluates the expression with every input taken from `input`.
    pub fn evaluate(&self, input: &Input) -> Result<Value, EvalError> {
        self.evaluate_with(&|name, ty| {
            let value = input.get(name).ok_or_else(|| EvalError::UnknownInput(name.to_string()))?;
            if value.ty() != ty {
                return Err(EvalError::TypeMismatch {
                    context: format!("input `{}`", name),
                    expected: ty,
                    found: value.ty(),
                });
            }
            Ok(value)
        })
    }

    /// Evaluates the expression, resolving input leaves through `lookup`.
    pub fn evaluate_with(&self, lookup: &dyn Fn(&str, ValueType) -> Result<Value, EvalError>) -> Result<Value, EvalError> {
        match self {
            Expr::Const(v) => Ok(*v),
            Expr::Input(name, ty) => lookup(name, *ty),
            Expr::Neg(e) => Ok(Value::Int(expect_int(e.evaluate_with(lookup)?, "-")?.wrapping_neg())),
            Expr::Not(e) => Ok(Value::Bool(!expect_bool(e.evaluate_with(lookup)?, "!")?)),
            Expr::Binary(op, l, r) => {
                let a = expect_int(l.evaluate_with(lookup)?, op.symbol())?;
                let b = expect_int(r.evaluate_with(lookup)?, op.symbol())?;
                Ok(Value::Int(op.apply(a, b)))
            }
            Expr::Compare(op, l, r) => {
                let a = expect_int(l.evaluate_with(lookup)?, op.symbol())?;
                let b = expect_int(r.evaluate_with(lookup)?, op.symbol())?;
                Ok(Value::Bool(op.apply(a, b)))
            }
            Expr::Logic(op, l, r) => {
                let a = expect_bool(l.evaluate_with(lookup)?, op.symbol())?;
                let b = expect_bool(r.evaluate_with(lookup)?, op.symbol())?;
                Ok(Value::Bool(op.apply(a, b)))
            }
        }
    }
}

fn expect_int(value: Value, op: &str) -> Result<i64, EvalError> {
    value.as_int().ok_or_else(|| EvalError::TypeMismatch {
        context: format!("operand of `{}`", op),
        expected: ValueType::Int,
        found: value.ty(),
    })
}

fn expect_bool(value: Value, op: &str) -> Result<bool, EvalError> {
    value.as_bool().ok_or_else(|| EvalError::TypeMismatch {
        context: format!("operand of `{}`", op),
        expected: ValueType::Bool,
        found: value.ty(),
    })
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{}", v),
            Expr::Input(name, _) => write!(f, "{}", name),
            Expr::Neg(e) => write!(f, "-{}", e),
            Expr::Not(e) => write!(f, "!{}", e),
            Expr::Binary(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
            Expr::Compare(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
            Expr::Logic(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n() -> Expr {
        Expr::input("n", ValueType::Int)
    }

    #[test]
    fn test_negate_comparison() {
        let p = Expr::compare(CompareOp::Lt, n(), Expr::int(0));
        assert_eq!(p.negate(), Expr::compare(CompareOp::Ge, n(), Expr::int(0)));
        assert_eq!(p.negate().negate(), p);
    }

    #[test]
    fn test_negate_compound() {
        let p = Expr::logic(
            LogicOp::And,
            Expr::compare(CompareOp::Gt, n(), Expr::int(0)),
            Expr::compare(CompareOp::Lt, n(), Expr::int(10)),
        );
        let q = p.negate();
        assert!(matches!(q, Expr::Not(_)));
        assert_eq!(q.negate(), p);
    }

    #[test]
    fn test_evaluate() {
        let input = Input::from_iter([("n", Value::Int(7))]);
        let e = Expr::compare(
            CompareOp::Eq,
            Expr::binary(BinaryOp::Mul, n(), Expr::int(2)),
            Expr::int(14),
        );
        assert_eq!(e.evaluate(&input), Ok(Value::Bool(true)));
        assert_eq!(e.ty(), ValueType::Bool);
        assert_eq!(e.inputs().into_iter().collect::<Vec<_>>(), vec!["n"]);
    }

    #[test]
    fn test_evaluate_errors() {
        let input = Input::from_iter([("n", Value::Bool(true))]);
        assert!(matches!(n().evaluate(&input), Err(EvalError::TypeMismatch { .. })));

        let empty = Input::default();
        assert_eq!(n().evaluate(&empty), Err(EvalError::UnknownInput("n".to_string())));
    }
}
