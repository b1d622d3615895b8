//! Interpreter that evaluates expression trees against named scalar values
//!
//! Null handling follows SQL: comparisons and arithmetic with a null operand
//! yield null, `and`/`or` use three-valued logic, and a null base never
//! matches a `when` branch.

use std::cmp::Ordering;
use std::collections::HashMap;

use thiserror::Error;

use crate::dispatch::{DispatchError, Visitor, walk};
use crate::node::{Expr, Literal, Operation, Operator, Path};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Unknown path: {0}")]
    UnknownPath(String),

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow in {0}")]
    Overflow(Operator),

    #[error("{0} cannot be evaluated against scalar values")]
    Unsupported(Operator),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

type Result<T> = std::result::Result<T, EvalError>;

/// Values bound to path names, keyed by dotted name
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    values: HashMap<String, Literal>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `path` (dotted, e.g. `customer.annual_spending`) to `value`
    pub fn with_value(mut self, path: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.values.insert(path.into(), value.into());
        self
    }

    pub fn set(&mut self, path: impl Into<String>, value: impl Into<Literal>) {
        self.values.insert(path.into(), value.into());
    }

    pub fn get(&self, path: &str) -> Option<&Literal> {
        self.values.get(path)
    }
}

/// Evaluate `expr` to a single value
pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> Result<Literal> {
    walk(&mut Evaluator { ctx }, expr)
}

struct Evaluator<'a> {
    ctx: &'a EvalContext,
}

impl Visitor for Evaluator<'_> {
    type Output = Literal;
    type Error = EvalError;

    fn family(&self) -> &str {
        "eval"
    }

    fn visit_constant(&mut self, value: &Literal) -> Result<Literal> {
        Ok(value.clone())
    }

    fn visit_path(&mut self, path: &Path) -> Result<Literal> {
        let name = path.dotted();
        self.ctx
            .get(&name)
            .cloned()
            .ok_or(EvalError::UnknownPath(name))
    }

    fn visit_operation(&mut self, op: &Operation) -> Result<Literal> {
        match (op.operator(), op.args()) {
            (
                operator @ (Operator::Eq
                | Operator::Ne
                | Operator::Lt
                | Operator::Le
                | Operator::Gt
                | Operator::Ge),
                [lhs, rhs],
            ) => {
                let l = walk(self, lhs)?;
                let r = walk(self, rhs)?;
                eval_comparison(operator, &l, &r)
            }
            (Operator::And, [lhs, rhs]) => {
                let l = as_bool(walk(self, lhs)?)?;
                if l == Some(false) {
                    return Ok(Literal::Bool(false));
                }
                let r = as_bool(walk(self, rhs)?)?;
                Ok(match (l, r) {
                    (_, Some(false)) => Literal::Bool(false),
                    (Some(true), Some(true)) => Literal::Bool(true),
                    _ => Literal::Null,
                })
            }
            (Operator::Or, [lhs, rhs]) => {
                let l = as_bool(walk(self, lhs)?)?;
                if l == Some(true) {
                    return Ok(Literal::Bool(true));
                }
                let r = as_bool(walk(self, rhs)?)?;
                Ok(match (l, r) {
                    (_, Some(true)) => Literal::Bool(true),
                    (Some(false), Some(false)) => Literal::Bool(false),
                    _ => Literal::Null,
                })
            }
            (Operator::Not, [inner]) => Ok(match as_bool(walk(self, inner)?)? {
                Some(b) => Literal::Bool(!b),
                None => Literal::Null,
            }),
            (Operator::IsNull, [inner]) => {
                Ok(Literal::Bool(walk(self, inner)? == Literal::Null))
            }
            (Operator::IsNotNull, [inner]) => {
                Ok(Literal::Bool(walk(self, inner)? != Literal::Null))
            }
            (
                operator @ (Operator::Add | Operator::Sub | Operator::Mul | Operator::Div),
                [lhs, rhs],
            ) => {
                let l = walk(self, lhs)?;
                let r = walk(self, rhs)?;
                eval_arithmetic(operator, l, r)
            }
            (Operator::Neg, [inner]) => match walk(self, inner)? {
                Literal::Int(n) => n
                    .checked_neg()
                    .map(Literal::Int)
                    .ok_or(EvalError::Overflow(Operator::Neg)),
                Literal::Float(n) => Ok(Literal::Float(-n)),
                Literal::Null => Ok(Literal::Null),
                other => Err(type_error("number", &other)),
            },
            // Only the matching branch's result and, on a miss, the rest of
            // the chain are evaluated.
            (Operator::CaseEqWhen, [base, condition, result, rest]) => {
                let base = walk(self, base)?;
                let condition = walk(self, condition)?;
                if compare(&base, &condition)? == Some(Ordering::Equal) {
                    walk(self, result)
                } else {
                    walk(self, rest)
                }
            }
            (Operator::CaseEqElse, [default]) => walk(self, default),
            (Operator::CaseEq, [_, chain]) => walk(self, chain),
            (operator, _) => Err(EvalError::Unsupported(operator)),
        }
    }
}

fn eval_comparison(op: Operator, l: &Literal, r: &Literal) -> Result<Literal> {
    let Some(ordering) = compare(l, r)? else {
        return Ok(Literal::Null);
    };
    let result = match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Le => ordering != Ordering::Greater,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Ge => ordering != Ordering::Less,
        other => return Err(EvalError::Unsupported(other)),
    };
    Ok(Literal::Bool(result))
}

/// Order two values; `None` when either side is null (or NaN)
fn compare(l: &Literal, r: &Literal) -> Result<Option<Ordering>> {
    let ordering = match (l, r) {
        (Literal::Null, _) | (_, Literal::Null) => None,
        (Literal::Int(a), Literal::Int(b)) => Some(a.cmp(b)),
        (Literal::Float(a), Literal::Float(b)) => a.partial_cmp(b),
        (Literal::Int(a), Literal::Float(b)) => cmp_int_float(*a, *b),
        (Literal::Float(a), Literal::Int(b)) => cmp_int_float(*b, *a).map(Ordering::reverse),
        (Literal::String(a), Literal::String(b)) => Some(a.cmp(b)),
        (Literal::Bool(a), Literal::Bool(b)) => Some(a.cmp(b)),
        (a, b) => {
            return Err(EvalError::TypeError {
                expected: a.value_type().to_string(),
                got: b.value_type().to_string(),
            });
        }
    };
    Ok(ordering)
}

/// Exact ordering of an integer against a float, without rounding the integer
fn cmp_int_float(int: i64, float: f64) -> Option<Ordering> {
    // 2^63, exactly representable
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return None;
    }
    if float >= BOUND {
        return Some(Ordering::Less);
    }
    if float < -BOUND {
        return Some(Ordering::Greater);
    }
    let whole = float.trunc();
    // in range, so the cast is exact
    let ordering = int.cmp(&(whole as i64)).then(if float > whole {
        Ordering::Less
    } else if float < whole {
        Ordering::Greater
    } else {
        Ordering::Equal
    });
    Some(ordering)
}

fn eval_arithmetic(op: Operator, l: Literal, r: Literal) -> Result<Literal> {
    match (l, r) {
        (Literal::Null, _) | (_, Literal::Null) => Ok(Literal::Null),
        (Literal::Int(a), Literal::Int(b)) => {
            let value = match op {
                Operator::Add => a.checked_add(b),
                Operator::Sub => a.checked_sub(b),
                Operator::Mul => a.checked_mul(b),
                Operator::Div if b == 0 => return Err(EvalError::DivisionByZero),
                Operator::Div => a.checked_div(b),
                other => return Err(EvalError::Unsupported(other)),
            };
            value.map(Literal::Int).ok_or(EvalError::Overflow(op))
        }
        (Literal::Int(a), Literal::Float(b)) => float_arithmetic(op, a as f64, b),
        (Literal::Float(a), Literal::Int(b)) => float_arithmetic(op, a, b as f64),
        (Literal::Float(a), Literal::Float(b)) => float_arithmetic(op, a, b),
        (Literal::Int(_) | Literal::Float(_), other) | (other, _) => {
            Err(type_error("number", &other))
        }
    }
}

fn float_arithmetic(op: Operator, a: f64, b: f64) -> Result<Literal> {
    let value = match op {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mul => a * b,
        Operator::Div if b == 0.0 => return Err(EvalError::DivisionByZero),
        Operator::Div => a / b,
        other => return Err(EvalError::Unsupported(other)),
    };
    Ok(Literal::Float(value))
}

fn as_bool(value: Literal) -> Result<Option<bool>> {
    match value {
        Literal::Bool(b) => Ok(Some(b)),
        Literal::Null => Ok(None),
        other => Err(type_error("bool", &other)),
    }
}

fn type_error(expected: &str, got: &Literal) -> EvalError {
    EvalError::TypeError {
        expected: expected.to_string(),
        got: got.value_type().to_string(),
    }
}
