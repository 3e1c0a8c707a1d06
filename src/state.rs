//! Concrete inputs and the per-run symbolic state.
//!
//! The symbolic state binds every declared input to a symbolic value that
//! shadows its concrete seed. It is immutable for the life of a run: local
//! variables of the target are tracked by the target itself, through the
//! [`SymbolicValue`]s it computes.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::EvalError;
use crate::expr::Expr;
use crate::value::{SymbolicValue, Value, ValueType};

/// Candidate input: a concrete value for every input variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Input {
    values: BTreeMap<String, Value>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> + '_ {
        self.values.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Declared variables with their types, in name order.
    pub fn signature(&self) -> Vec<(String, ValueType)> {
        self.values.iter().map(|(k, v)| (k.clone(), v.ty())).collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Input {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut input = Input::new();
        for (k, v) in iter {
            input.set(k, v);
        }
        input
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Immutable binding of input variables to their symbolic shadows.
#[derive(Debug, Clone)]
pub struct SymbolicState {
    bindings: BTreeMap<String, SymbolicValue>,
}

impl SymbolicState {
    /// Declares every variable of `input` as symbolic, seeded with its value.
    pub fn new(input: &Input) -> Self {
        let bindings = input
            .iter()
            .map(|(name, value)| {
                let shadow = SymbolicValue::Symbolic {
                    expr: Expr::input(name, value.ty()),
                    value,
                };
                (name.to_string(), shadow)
            })
            .collect();
        Self { bindings }
    }

    /// Symbolic value of an input variable.
    pub fn get(&self, name: &str) -> Option<&SymbolicValue> {
        self.bindings.get(name)
    }

    /// Evaluates an expression tree against the bindings.
    ///
    /// The result is symbolic iff the expression mentions an input.
    pub fn eval(&self, expr: &Expr) -> Result<SymbolicValue, EvalError> {
        let value = expr.evaluate_with(&|name, ty| {
            let bound = self.get(name).ok_or_else(|| EvalError::UnknownInput(name.to_string()))?;
            if bound.ty() != ty {
                return Err(EvalError::TypeMismatch {
                    context: format!("input `{}`", name),
                    expected: ty,
                    found: bound.ty(),
                });
            }
            Ok(bound.value())
        })?;
        if expr.inputs().is_empty() {
            Ok(SymbolicValue::Concrete(value))
        } else {
            Ok(SymbolicValue::Symbolic {
                expr: expr.clone(),
                value,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, CompareOp};

    #[test]
    fn test_input_display() {
        let input = Input::new().with("n", 5).with("flag", true);
        assert_eq!(input.to_string(), "{flag = true, n = 5}");
        assert_eq!(input.signature(), vec![("flag".to_string(), ValueType::Bool), ("n".to_string(), ValueType::Int)]);
    }

    #[test]
    fn test_bindings_are_symbolic() {
        let state = SymbolicState::new(&Input::new().with("n", 5));
        let n = state.get("n").unwrap();
        assert!(n.is_symbolic());
        assert_eq!(n.value(), Value::Int(5));
        assert!(state.get("m").is_none());
    }

    #[test]
    fn test_eval() {
        let state = SymbolicState::new(&Input::new().with("n", 5));
        let n = Expr::input("n", ValueType::Int);

        let p = Expr::compare(CompareOp::Le, Expr::binary(BinaryOp::Sub, n, Expr::int(2)), Expr::int(3));
        let v = state.eval(&p).unwrap();
        assert!(v.is_symbolic());
        assert_eq!(v.value(), Value::Bool(true));

        let c = Expr::compare(CompareOp::Lt, Expr::int(1), Expr::int(2));
        assert_eq!(state.eval(&c).unwrap(), SymbolicValue::Concrete(Value::Bool(true)));
    }

    #[test]
    fn test_eval_unknown_input() {
        let state = SymbolicState::new(&Input::new());
        let e = Expr::input("x", ValueType::Int);
        assert_eq!(state.eval(&e), Err(EvalError::UnknownInput("x".to_string())));
    }
}
