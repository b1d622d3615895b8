//! Expression node model
//!
//! Leaves are constants and named paths. Composite nodes are operations tagged
//! with an [`Operator`] whose arity is checked when the node is built, so every
//! `Operation` reachable from a tree has exactly as many children as its
//! operator declares.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Arity error: {operator} takes {expected} operand(s), got {got}")]
    Arity {
        operator: Operator,
        expected: usize,
        got: usize,
    },

    #[error("Result type mismatch: expected {expected}, got {got}")]
    ResultType { expected: ValueType, got: ValueType },

    #[error("Condition type mismatch: base is {base}, condition is {got}")]
    ConditionType { base: ValueType, got: ValueType },
}

/// Type descriptor for the value a node yields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    String,
    Null,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Null => "null",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Literal {
    pub fn value_type(&self) -> ValueType {
        match self {
            Literal::String(_) => ValueType::String,
            Literal::Int(_) => ValueType::Int,
            Literal::Float(_) => ValueType::Float,
            Literal::Bool(_) => ValueType::Bool,
            Literal::Null => ValueType::Null,
        }
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Int(n)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Int(n.into())
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Float(n)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.into())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

/// Operator tag. Each operator fixes the number of children its node takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Boolean connectives
    And,
    Or,
    Not,

    // Null tests
    IsNull,
    IsNotNull,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Neg,

    // case base when .. then .. else .. end
    CaseEq,
    CaseEqWhen,
    CaseEqElse,

    // Aggregates
    CountAll,
}

impl Operator {
    pub const fn arity(self) -> usize {
        match self {
            Operator::CountAll => 0,
            Operator::Not
            | Operator::IsNull
            | Operator::IsNotNull
            | Operator::Neg
            | Operator::CaseEqElse => 1,
            Operator::Eq
            | Operator::Ne
            | Operator::Lt
            | Operator::Le
            | Operator::Gt
            | Operator::Ge
            | Operator::And
            | Operator::Or
            | Operator::Add
            | Operator::Sub
            | Operator::Mul
            | Operator::Div
            | Operator::CaseEq => 2,
            // base, condition, result, rest of the chain
            Operator::CaseEqWhen => 4,
        }
    }

    /// Canonical variant of operation nodes carrying this operator
    pub const fn kind(self) -> NodeKind {
        match self {
            Operator::Eq
            | Operator::Ne
            | Operator::Lt
            | Operator::Le
            | Operator::Gt
            | Operator::Ge => NodeKind::Comparison,
            Operator::And | Operator::Or | Operator::Not => NodeKind::Connective,
            Operator::IsNull | Operator::IsNotNull => NodeKind::NullTest,
            Operator::Add | Operator::Sub | Operator::Mul | Operator::Div | Operator::Neg => {
                NodeKind::Arithmetic
            }
            Operator::CaseEq | Operator::CaseEqWhen | Operator::CaseEqElse => NodeKind::Case,
            Operator::CountAll => NodeKind::Aggregate,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "EQ",
            Operator::Ne => "NE",
            Operator::Lt => "LT",
            Operator::Le => "LE",
            Operator::Gt => "GT",
            Operator::Ge => "GE",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
            Operator::IsNull => "IS_NULL",
            Operator::IsNotNull => "IS_NOT_NULL",
            Operator::Add => "ADD",
            Operator::Sub => "SUB",
            Operator::Mul => "MUL",
            Operator::Div => "DIV",
            Operator::Neg => "NEG",
            Operator::CaseEq => "CASE_EQ",
            Operator::CaseEqWhen => "CASE_EQ_WHEN",
            Operator::CaseEqElse => "CASE_EQ_ELSE",
            Operator::CountAll => "COUNT_ALL",
        };
        write!(f, "{}", s)
    }
}

/// Closed taxonomy of canonical node variants that handlers are declared for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Constant,
    Path,
    Comparison,
    Connective,
    NullTest,
    Arithmetic,
    Case,
    Aggregate,
}

impl NodeKind {
    pub const ALL: [NodeKind; 8] = [
        NodeKind::Constant,
        NodeKind::Path,
        NodeKind::Comparison,
        NodeKind::Connective,
        NodeKind::NullTest,
        NodeKind::Arithmetic,
        NodeKind::Case,
        NodeKind::Aggregate,
    ];
}

/// Concrete runtime form of a node, finer than its [`NodeKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Constant(ValueType),
    Path(ValueType),
    Operation(Operator),
}

impl Shape {
    pub const fn kind(self) -> NodeKind {
        match self {
            Shape::Constant(_) => NodeKind::Constant,
            Shape::Path(_) => NodeKind::Path,
            Shape::Operation(op) => op.kind(),
        }
    }
}

/// Named reference, optionally qualified by a parent: `customer.annual_spending`
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    name: String,
    value_type: ValueType,
    parent: Option<Arc<Path>>,
}

impl Path {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            parent: None,
        }
    }

    pub fn child(&self, name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn parent(&self) -> Option<&Path> {
        self.parent.as_deref()
    }

    /// Full name from the root of the chain, joined with `.`
    pub fn dotted(&self) -> String {
        match self.parent() {
            Some(parent) => format!("{}.{}", parent.dotted(), self.name),
            None => self.name.clone(),
        }
    }
}

/// Operator applied to an ordered list of operands.
///
/// Only built through [`Expr::operation`] or the typed helpers on [`Expr`],
/// both of which guarantee `args.len() == operator.arity()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    operator: Operator,
    value_type: ValueType,
    args: Vec<Expr>,
}

impl Operation {
    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn args(&self) -> &[Expr] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Expr> {
        self.args.get(index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    Constant(Literal),

    /// Named reference: `customer.annual_spending`
    Path(Path),

    /// Operator node: `a = b`, `not a`, `case .. end`
    Operation(Operation),
}

impl Expr {
    pub fn constant(value: impl Into<Literal>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn path(name: impl Into<String>, value_type: ValueType) -> Self {
        Expr::Path(Path::new(name, value_type))
    }

    /// Build an operation node, rejecting operand counts that do not match
    /// the operator's arity.
    pub fn operation(
        operator: Operator,
        value_type: ValueType,
        args: Vec<Expr>,
    ) -> Result<Self, ExprError> {
        if args.len() != operator.arity() {
            return Err(ExprError::Arity {
                operator,
                expected: operator.arity(),
                got: args.len(),
            });
        }
        Ok(Self::op(operator, value_type, args))
    }

    // Callers pass a fixed number of operands matching the operator.
    fn op(operator: Operator, value_type: ValueType, args: Vec<Expr>) -> Self {
        debug_assert_eq!(args.len(), operator.arity());
        Expr::Operation(Operation {
            operator,
            value_type,
            args,
        })
    }

    pub fn children(&self) -> &[Expr] {
        match self {
            Expr::Constant(_) | Expr::Path(_) => &[],
            Expr::Operation(op) => op.args(),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Expr::Constant(lit) => lit.value_type(),
            Expr::Path(path) => path.value_type(),
            Expr::Operation(op) => op.value_type(),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Expr::Constant(lit) => Shape::Constant(lit.value_type()),
            Expr::Path(path) => Shape::Path(path.value_type()),
            Expr::Operation(op) => Shape::Operation(op.operator()),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.shape().kind()
    }

    // === Typed helpers ===

    pub fn eq(self, rhs: impl Into<Expr>) -> Self {
        self.predicate(Operator::Eq, rhs)
    }

    pub fn ne(self, rhs: impl Into<Expr>) -> Self {
        self.predicate(Operator::Ne, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        self.predicate(Operator::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        self.predicate(Operator::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        self.predicate(Operator::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        self.predicate(Operator::Ge, rhs)
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        self.predicate(Operator::And, rhs)
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Self {
        self.predicate(Operator::Or, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::op(Operator::Not, ValueType::Bool, vec![self])
    }

    pub fn is_null(self) -> Self {
        Self::op(Operator::IsNull, ValueType::Bool, vec![self])
    }

    pub fn is_not_null(self) -> Self {
        Self::op(Operator::IsNotNull, ValueType::Bool, vec![self])
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(self, rhs: impl Into<Expr>) -> Self {
        self.arithmetic(Operator::Add, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, rhs: impl Into<Expr>) -> Self {
        self.arithmetic(Operator::Sub, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, rhs: impl Into<Expr>) -> Self {
        self.arithmetic(Operator::Mul, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn div(self, rhs: impl Into<Expr>) -> Self {
        self.arithmetic(Operator::Div, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(self) -> Self {
        let value_type = self.value_type();
        Self::op(Operator::Neg, value_type, vec![self])
    }

    /// `count(*)`
    pub fn count_all() -> Self {
        Self::op(Operator::CountAll, ValueType::Int, vec![])
    }

    fn predicate(self, operator: Operator, rhs: impl Into<Expr>) -> Self {
        Self::op(operator, ValueType::Bool, vec![self, rhs.into()])
    }

    fn arithmetic(self, operator: Operator, rhs: impl Into<Expr>) -> Self {
        let value_type = self.value_type();
        Self::op(operator, value_type, vec![self, rhs.into()])
    }
}

impl From<Literal> for Expr {
    fn from(lit: Literal) -> Self {
        Expr::Constant(lit)
    }
}

impl From<Path> for Expr {
    fn from(path: Path) -> Self {
        Expr::Path(path)
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::constant(n)
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::constant(n)
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::constant(n)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::constant(b)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::constant(s)
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::constant(s)
    }
}
