//! Concrete values and their symbolic shadows.
//!
//! Integers are `i64` with two's-complement wrapping arithmetic, the same
//! semantics the bit-blasting solver reasons about.

use std::fmt;
use std::ops::{Add, Mul, Neg, Not, Sub};

use crate::error::Fault;
use crate::expr::{BinaryOp, CompareOp, Expr, LogicOp};

/// Type of a value or an input variable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ValueType {
    Int,
    Bool,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int => write!(f, "int"),
            ValueType::Bool => write!(f, "bool"),
        }
    }
}

/// A concrete value.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Value {
    Int(i64),
    Bool(bool),
}

impl Value {
    pub fn ty(self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Bool(_) => ValueType::Bool,
        }
    }

    pub fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(x) => Some(x),
            Value::Bool(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(b),
            Value::Int(_) => None,
        }
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Value::Int(x)
    }
}

impl From<i32> for Value {
    fn from(x: i32) -> Self {
        Value::Int(x as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A value as seen by the concolic executor.
///
/// Anything computed from at least one symbolic operand is itself symbolic and
/// carries both its expression over the inputs and its concrete value.
/// Operations on two concrete operands fold to a concrete result.
///
/// # Panics
///
/// The operators and the comparison and connective helpers panic when an
/// operand has the wrong type. The `try_*` forms return
/// [`Fault::OperandType`] instead; inside a target a panic is recorded as
/// [`Fault::Panicked`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolicValue {
    Concrete(Value),
    Symbolic { expr: Expr, value: Value },
}

impl SymbolicValue {
    /// The concrete value used to drive execution.
    pub fn value(&self) -> Value {
        match self {
            SymbolicValue::Concrete(v) => *v,
            SymbolicValue::Symbolic { value, .. } => *value,
        }
    }

    pub fn ty(&self) -> ValueType {
        self.value().ty()
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, SymbolicValue::Symbolic { .. })
    }

    /// The symbolic expression, if any.
    pub fn expr(&self) -> Option<&Expr> {
        match self {
            SymbolicValue::Concrete(_) => None,
            SymbolicValue::Symbolic { expr, .. } => Some(expr),
        }
    }

    /// Expression form: the symbolic expression, or a constant leaf.
    pub fn to_expr(&self) -> Expr {
        match self {
            SymbolicValue::Concrete(v) => Expr::Const(*v),
            SymbolicValue::Symbolic { expr, .. } => expr.clone(),
        }
    }

    fn int(&self, op: &str) -> Result<i64, Fault> {
        match self.value() {
            Value::Int(x) => Ok(x),
            Value::Bool(_) => Err(Fault::OperandType {
                op: op.to_string(),
                expected: ValueType::Int,
                found: ValueType::Bool,
            }),
        }
    }

    fn boolean(&self, op: &str) -> Result<bool, Fault> {
        match self.value() {
            Value::Bool(b) => Ok(b),
            Value::Int(_) => Err(Fault::OperandType {
                op: op.to_string(),
                expected: ValueType::Bool,
                found: ValueType::Int,
            }),
        }
    }

    fn combine(lhs: &Self, rhs: &Self, value: Value, build: impl FnOnce(Expr, Expr) -> Expr) -> Self {
        if lhs.is_symbolic() || rhs.is_symbolic() {
            SymbolicValue::Symbolic {
                expr: build(lhs.to_expr(), rhs.to_expr()),
                value,
            }
        } else {
            SymbolicValue::Concrete(value)
        }
    }

    /// Wrapping arithmetic on two integer operands.
    pub fn try_arith(&self, op: BinaryOp, rhs: impl Into<SymbolicValue>) -> Result<Self, Fault> {
        let rhs = rhs.into();
        let value = Value::Int(op.apply(self.int(op.symbol())?, rhs.int(op.symbol())?));
        Ok(Self::combine(self, &rhs, value, |l, r| Expr::binary(op, l, r)))
    }

    /// Comparison of two integer operands.
    pub fn try_compare(&self, op: CompareOp, rhs: impl Into<SymbolicValue>) -> Result<Self, Fault> {
        let rhs = rhs.into();
        let value = Value::Bool(op.apply(self.int(op.symbol())?, rhs.int(op.symbol())?));
        Ok(Self::combine(self, &rhs, value, |l, r| Expr::compare(op, l, r)))
    }

    pub fn try_logic(&self, op: LogicOp, rhs: impl Into<SymbolicValue>) -> Result<Self, Fault> {
        let rhs = rhs.into();
        let value = Value::Bool(op.apply(self.boolean(op.symbol())?, rhs.boolean(op.symbol())?));
        Ok(Self::combine(self, &rhs, value, |l, r| Expr::logic(op, l, r)))
    }

    fn arith(&self, op: BinaryOp, rhs: &Self) -> Self {
        self.try_arith(op, rhs).unwrap_or_else(|fault| panic!("{}", fault))
    }

    /// Comparison producing a boolean branch predicate.
    pub fn compare(&self, op: CompareOp, rhs: impl Into<SymbolicValue>) -> Self {
        self.try_compare(op, rhs).unwrap_or_else(|fault| panic!("{}", fault))
    }

    pub fn lt(&self, rhs: impl Into<SymbolicValue>) -> Self {
        self.compare(CompareOp::Lt, rhs)
    }
    pub fn le(&self, rhs: impl Into<SymbolicValue>) -> Self {
        self.compare(CompareOp::Le, rhs)
    }
    pub fn gt(&self, rhs: impl Into<SymbolicValue>) -> Self {
        self.compare(CompareOp::Gt, rhs)
    }
    pub fn ge(&self, rhs: impl Into<SymbolicValue>) -> Self {
        self.compare(CompareOp::Ge, rhs)
    }
    pub fn eq(&self, rhs: impl Into<SymbolicValue>) -> Self {
        self.compare(CompareOp::Eq, rhs)
    }
    pub fn ne(&self, rhs: impl Into<SymbolicValue>) -> Self {
        self.compare(CompareOp::Ne, rhs)
    }

    pub fn and(&self, rhs: impl Into<SymbolicValue>) -> Self {
        self.try_logic(LogicOp::And, rhs).unwrap_or_else(|fault| panic!("{}", fault))
    }

    pub fn or(&self, rhs: impl Into<SymbolicValue>) -> Self {
        self.try_logic(LogicOp::Or, rhs).unwrap_or_else(|fault| panic!("{}", fault))
    }
}

impl From<Value> for SymbolicValue {
    fn from(v: Value) -> Self {
        SymbolicValue::Concrete(v)
    }
}

impl From<i64> for SymbolicValue {
    fn from(x: i64) -> Self {
        SymbolicValue::Concrete(Value::Int(x))
    }
}

impl From<i32> for SymbolicValue {
    fn from(x: i32) -> Self {
        SymbolicValue::Concrete(Value::Int(x as i64))
    }
}

impl From<bool> for SymbolicValue {
    fn from(b: bool) -> Self {
        SymbolicValue::Concrete(Value::Bool(b))
    }
}

impl From<&SymbolicValue> for SymbolicValue {
    fn from(v: &SymbolicValue) -> Self {
        v.clone()
    }
}

impl fmt::Display for SymbolicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolicValue::Concrete(v) => write!(f, "{}", v),
            SymbolicValue::Symbolic { expr, value } => write!(f, "{} [= {}]", expr, value),
        }
    }
}

macro_rules! impl_arith {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<SymbolicValue>> $trait<R> for SymbolicValue {
            type Output = SymbolicValue;

            fn $method(self, rhs: R) -> Self::Output {
                self.arith($op, &rhs.into())
            }
        }

        impl<R: Into<SymbolicValue>> $trait<R> for &SymbolicValue {
            type Output = SymbolicValue;

            fn $method(self, rhs: R) -> Self::Output {
                self.arith($op, &rhs.into())
            }
        }
    };
}

impl_arith!(Add, add, BinaryOp::Add);
impl_arith!(Sub, sub, BinaryOp::Sub);
impl_arith!(Mul, mul, BinaryOp::Mul);

impl Neg for &SymbolicValue {
    type Output = SymbolicValue;

    fn neg(self) -> Self::Output {
        let value = Value::Int(self.int("-").unwrap_or_else(|fault| panic!("{}", fault)).wrapping_neg());
        match self {
            SymbolicValue::Concrete(_) => SymbolicValue::Concrete(value),
            SymbolicValue::Symbolic { expr, .. } => SymbolicValue::Symbolic {
                expr: Expr::neg(expr.clone()),
                value,
            },
        }
    }
}

impl Neg for SymbolicValue {
    type Output = SymbolicValue;

    fn neg(self) -> Self::Output {
        -&self
    }
}

impl Not for &SymbolicValue {
    type Output = SymbolicValue;

    fn not(self) -> Self::Output {
        let value = Value::Bool(!self.boolean("!").unwrap_or_else(|fault| panic!("{}", fault)));
        match self {
            SymbolicValue::Concrete(_) => SymbolicValue::Concrete(value),
            SymbolicValue::Symbolic { expr, .. } => SymbolicValue::Symbolic {
                expr: expr.negate(),
                value,
            },
        }
    }
}

impl Not for SymbolicValue {
    type Output = SymbolicValue;

    fn not(self) -> Self::Output {
        !&self
    }
}
